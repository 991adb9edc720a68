//! Demonstration Pipelines
//!
//! Small flows exercising each engine feature. Step bodies stand in for
//! model calls, web fetches and the like.

use std::error::Error;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use colored::Colorize;
use serde_json::{json, Value};

use stepgraph::execution::{
    AsyncBatchNode, AsyncBatchStep, AsyncFlow, BatchNode, BatchStep, Flow, FnStep, Node, ParallelBatchNode, Step,
};
use stepgraph::monitoring::ExecutionTimeline;
use stepgraph::workflow::{Action, EngineConfig, SharedStore};
use stepgraph::StepError;

pub type DemoResult = Result<SharedStore, Box<dyn Error>>;

/// Names accepted on the command line, in display order.
pub const DEMOS: &[(&str, &str)] = &[
    ("hello", "single step answering a question"),
    ("chain", "three steps wired in sequence"),
    ("branch", "conditional edges chosen by the returned action"),
    ("retry", "flaky step recovered by retries and a fallback"),
    ("nested", "a validation flow used as one step of another flow"),
    ("batch", "per-item execution over a prepared list"),
    ("parallel", "sequential vs parallel batch timing"),
    ("loop", "generate/check cycle ending on acceptance"),
];

/// Settings shared by all demos.
pub struct DemoContext {
    pub config: EngineConfig,
    pub timeline: ExecutionTimeline,
}

pub fn run_demo(name: &str, ctx: &mut DemoContext) -> DemoResult {
    match name {
        "hello" => hello(ctx),
        "chain" => chain(ctx),
        "branch" => branch(ctx),
        "retry" => retry(ctx),
        "nested" => nested(ctx),
        "batch" => batch(ctx),
        "parallel" => parallel(ctx),
        "loop" => self_correcting_loop(ctx),
        other => Err(format!("Unknown demo: {}", other).into()),
    }
}

/// Step reading `from` and storing its output under `to`.
fn transform(
    name: &str,
    from: &'static str,
    to: &'static str,
    exec: impl Fn(&Value) -> Result<Value, StepError> + Send + Sync + 'static,
) -> Node<FnStep> {
    Node::new(
        name,
        FnStep::new(exec).with_prepare(read(from)).with_post(move |store, _, out| {
            store.insert_value(to, out.clone());
            Ok(None)
        }),
    )
}

/// Step without input storing its output under `to`.
fn writer(
    name: &str,
    to: &'static str,
    exec: impl Fn(&Value) -> Result<Value, StepError> + Send + Sync + 'static,
) -> Node<FnStep> {
    Node::new(
        name,
        FnStep::new(exec).with_post(move |store, _, out| {
            store.insert_value(to, out.clone());
            Ok(None)
        }),
    )
}

fn read(key: &'static str) -> impl Fn(&SharedStore) -> Result<Value, StepError> + Send + Sync + 'static {
    move |store| Ok(store.get_value(key).cloned().unwrap_or(Value::Null))
}

fn hello(ctx: &mut DemoContext) -> DemoResult {
    let mut builder = Flow::builder("hello");
    let answer = builder.add(Node::new(
        "answer",
        FnStep::new(|q| Ok(json!(format!("You asked: {}", q.as_str().unwrap_or("")))))
            .with_prepare(read("question"))
            .with_post(|store, _, out| {
                store.insert_value("answer", out.clone());
                Ok(None)
            }),
    ));
    builder.edge_policy(ctx.config.edges).start(answer);
    let flow = builder.build()?;

    let mut store = SharedStore::new();
    store.set("question", "What is a flow?")?;
    flow.run_traced(&mut store, &mut ctx.timeline)?;
    Ok(store)
}

fn chain(ctx: &mut DemoContext) -> DemoResult {
    let mut builder = Flow::builder("writing");
    builder.edge_policy(ctx.config.edges);
    let outline = builder.add(transform("outline", "topic", "outline", |topic| {
        let topic = topic.as_str().unwrap_or("flows");
        Ok(json!([
            format!("Why {}", topic),
            format!("How {} work", topic),
            "Summary".to_string()
        ]))
    }));
    let draft = builder.add(
        transform("draft", "outline", "draft", |outline| {
            let sections: Vec<String> = serde_json::from_value(outline.clone())?;
            Ok(json!(sections
                .iter()
                .map(|s| format!("{}: ...", s))
                .collect::<Vec<_>>()
                .join("\n")))
        })
        .with_retry(ctx.config.retry),
    );
    let polish = builder.add(transform("polish", "draft", "article", |draft| {
        Ok(json!(draft.as_str().unwrap_or("").replace("...", "(polished)")))
    }));
    builder.connect(outline, draft).connect(draft, polish).start(outline);
    let flow = builder.build()?;

    let mut store = SharedStore::new();
    store.set("topic", "step graphs")?;
    flow.run_traced(&mut store, &mut ctx.timeline)?;
    Ok(store)
}

struct Review;

impl Step for Review {
    type Prep = i64;
    type Output = &'static str;

    fn prepare(&self, store: &SharedStore) -> Result<i64, StepError> {
        Ok(store.get_or("score", 0))
    }

    fn execute(&self, score: &i64) -> Result<&'static str, StepError> {
        Ok(if *score >= 60 { "approve" } else { "reject" })
    }

    fn post(&self, store: &mut SharedStore, _: &i64, decision: &&'static str) -> Result<Option<Action>, StepError> {
        store.set("decision", decision)?;
        Ok(Some(Action::from(*decision)))
    }
}

fn branch(ctx: &mut DemoContext) -> DemoResult {
    let mut builder = Flow::builder("review");
    builder.edge_policy(ctx.config.edges);
    let review = builder.add(Node::new("review", Review));
    let approve = builder.add(writer("approve", "result", |_| Ok(json!("approved"))));
    let reject = builder.add(writer("reject", "result", |_| Ok(json!("rejected, please retry"))));
    builder
        .connect_on(review, "approve", approve)
        .connect_on(review, "reject", reject)
        .start(review);
    let flow = builder.build()?;

    let mut last = SharedStore::new();
    for score in [80, 45] {
        let mut store = SharedStore::new();
        store.set("score", &score)?;
        flow.run_traced(&mut store, &mut ctx.timeline)?;
        println!(
            "  score {:>3} -> {}",
            score,
            store.get::<String>("result")?.bold()
        );
        last = store;
    }
    Ok(last)
}

/// Fails its first `failures` attempts, like an unstable remote API.
struct UnstableApi {
    failures: u32,
}

impl Step for UnstableApi {
    type Prep = String;
    type Output = String;

    fn prepare(&self, store: &SharedStore) -> Result<String, StepError> {
        Ok(store.get_or("prompt", "Hello".to_string()))
    }

    fn execute(&self, prompt: &String) -> Result<String, StepError> {
        Ok(format!("processed '{}'", prompt))
    }

    fn execute_attempt(&self, prompt: &String, attempt: u32) -> Result<String, StepError> {
        if attempt < self.failures {
            println!("  attempt {} {}", attempt + 1, "failed".red());
            return Err("simulated network error".into());
        }
        println!("  attempt {} {}", attempt + 1, "succeeded".green());
        self.execute(prompt)
    }

    fn fallback(&self, prompt: &String, error: StepError) -> Result<String, StepError> {
        println!("  all attempts failed ({}), using fallback", error);
        Ok(format!("cached answer for '{}'", prompt))
    }

    fn post(&self, store: &mut SharedStore, _: &String, output: &String) -> Result<Option<Action>, StepError> {
        store.set("result", output)?;
        Ok(None)
    }
}

fn retry(ctx: &mut DemoContext) -> DemoResult {
    let api = UnstableApi { failures: 3 };
    let node = if ctx.config.retry.max_attempts > 1 {
        Node::new("unstable_api", api).with_retry(ctx.config.retry)
    } else {
        Node::new("unstable_api", api)
            .with_max_attempts(5)
            .with_retry_wait(Duration::from_millis(200))
    };

    let mut builder = Flow::builder("retry");
    let only = builder.add(node);
    builder.start(only);
    let flow = builder.build()?;

    let mut store = SharedStore::new();
    store.set("prompt", "explain quantum computing")?;
    flow.run_traced(&mut store, &mut ctx.timeline)?;
    Ok(store)
}

fn nested(ctx: &mut DemoContext) -> DemoResult {
    let mut inner = Flow::builder("validation");
    inner.edge_policy(ctx.config.edges);
    let format = inner.add(Node::new(
        "validate_format",
        FnStep::new(|data| Ok(json!(!data.as_str().unwrap_or("").is_empty())))
            .with_prepare(read("data"))
            .with_post(|store, _, ok| {
                store.insert_value("format_valid", ok.clone());
                Ok(None)
            }),
    ));
    let length = inner.add(Node::new(
        "validate_length",
        FnStep::new(|data| Ok(json!(data.as_str().unwrap_or("").chars().count() <= 100)))
            .with_prepare(read("data"))
            .with_post(|store, _, ok| {
                store.insert_value("length_valid", ok.clone());
                Ok(None)
            }),
    ));
    inner.connect(format, length).start(format);
    let validation = inner.build()?;

    let mut outer = Flow::builder("main");
    outer.edge_policy(ctx.config.edges);
    let prepare = outer.add(Node::new(
        "prepare",
        FnStep::new(|raw| Ok(json!(raw.as_str().unwrap_or("").trim())))
            .with_prepare(read("raw_input"))
            .with_post(|store, _, cleaned| {
                store.insert_value("data", cleaned.clone());
                Ok(None)
            }),
    ));
    let validate = outer.add(validation);
    let process = outer.add(Node::new(
        "process",
        FnStep::new(|info| {
            let ok = info["format_ok"].as_bool() == Some(true) && info["length_ok"].as_bool() == Some(true);
            Ok(if ok {
                json!(format!("processed: {}", info["data"].as_str().unwrap_or("")))
            } else {
                json!("validation failed, skipped")
            })
        })
        .with_prepare(|store| {
            Ok(json!({
                "data": store.get_value("data").cloned().unwrap_or(Value::Null),
                "format_ok": store.get_or("format_valid", false),
                "length_ok": store.get_or("length_valid", false),
            }))
        })
        .with_post(|store, _, out| {
            store.insert_value("result", out.clone());
            Ok(None)
        }),
    ));
    outer.connect(prepare, validate).connect(validate, process).start(prepare);
    let flow = outer.build()?;

    let mut store = SharedStore::new();
    store.set("raw_input", "  graph-driven pipelines  ")?;
    flow.run_traced(&mut store, &mut ctx.timeline)?;
    Ok(store)
}

struct Translate;

impl BatchStep for Translate {
    type Item = String;
    type Output = String;

    fn prepare(&self, store: &SharedStore) -> Result<Vec<String>, StepError> {
        Ok(store.get_or("texts", Vec::new()))
    }

    fn execute(&self, text: &String) -> Result<String, StepError> {
        Ok(format!("[EN] {}", text))
    }

    fn post(&self, store: &mut SharedStore, _: &[String], outputs: &[String]) -> Result<Option<Action>, StepError> {
        store.set("translations", outputs)?;
        Ok(None)
    }
}

fn batch(ctx: &mut DemoContext) -> DemoResult {
    let mut builder = Flow::builder("translate");
    let node = builder.add(BatchNode::new("translate", Translate).with_max_attempts(2));
    builder.start(node);
    let flow = builder.build()?;

    let mut store = SharedStore::new();
    store.set("texts", &["hello world", "flows are simple", "batches are handy"])?;
    flow.run_traced(&mut store, &mut ctx.timeline)?;
    Ok(store)
}

/// Simulated fetch taking a fixed delay per URL.
struct FetchUrl {
    delay: Duration,
}

#[async_trait]
impl AsyncBatchStep for FetchUrl {
    type Item = String;
    type Output = String;

    async fn prepare(&self, store: &SharedStore) -> Result<Vec<String>, StepError> {
        Ok(store.get("urls")?)
    }

    async fn execute(&self, url: &String) -> Result<String, StepError> {
        tokio::time::sleep(self.delay).await;
        Ok(format!("content of {}", url))
    }

    async fn post(&self, store: &mut SharedStore, _: &[String], pages: &[String]) -> Result<Option<Action>, StepError> {
        store.set("results", pages)?;
        Ok(None)
    }
}

fn parallel(ctx: &mut DemoContext) -> DemoResult {
    let urls: Vec<String> = (1..=8).map(|i| format!("https://api.example.com/data{}", i)).collect();
    let delay = Duration::from_millis(500);
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    let mut sequential = AsyncFlow::builder("sequential");
    let seq = sequential.add(AsyncBatchNode::new("fetch_sequential", FetchUrl { delay }));
    sequential.start(seq);
    let sequential = sequential.build()?;

    let mut parallel = AsyncFlow::builder("parallel");
    let par = parallel.add(
        ParallelBatchNode::new("fetch_parallel", FetchUrl { delay })
            .with_max_concurrency(ctx.config.max_concurrency),
    );
    parallel.start(par);
    let parallel = parallel.build()?;

    let mut store = SharedStore::new();
    store.set("urls", &urls)?;

    let timeline = &mut ctx.timeline;
    let (seq_time, par_time) = runtime.block_on(async {
        let start = Instant::now();
        sequential.run_traced(&mut store.clone(), timeline).await?;
        let seq_time = start.elapsed();

        let start = Instant::now();
        parallel.run_traced(&mut store, timeline).await?;
        Ok::<_, stepgraph::FlowError>((seq_time, start.elapsed()))
    })?;

    println!("  sequential: {:.2?}", seq_time);
    println!("  parallel:   {:.2?}", par_time);
    println!(
        "  speedup:    {}",
        format!("{:.1}x", seq_time.as_secs_f64() / par_time.as_secs_f64().max(f64::EPSILON)).bold()
    );
    Ok(store)
}

fn self_correcting_loop(ctx: &mut DemoContext) -> DemoResult {
    let mut builder = Flow::builder("self_correct");
    builder.edge_policy(ctx.config.edges);
    let generate = builder.add(Node::new(
        "generate",
        FnStep::new(|attempt| {
            let answer = match attempt.as_u64().unwrap_or(1) {
                1 => "A framework.",
                2 => "A framework for building apps.",
                _ => "A minimal graph engine where steps pick the next edge at runtime.",
            };
            Ok(json!(answer))
        })
        .with_prepare(|store| Ok(json!(store.get_or("attempt", 0u64) + 1)))
        .with_post(|store, attempt, answer| {
            store.insert_value("attempt", attempt.clone());
            store.insert_value("current_answer", answer.clone());
            Ok(None)
        }),
    ));
    let check = builder.add(Node::new(
        "check",
        FnStep::new(|answer| Ok(json!(answer.as_str().unwrap_or("").len() >= 40)))
            .with_prepare(read("current_answer"))
            .with_post(|store, answer, good| {
                if good.as_bool() == Some(true) {
                    store.insert_value("final_answer", answer.clone());
                    Ok(Some(Action::from("accept")))
                } else {
                    Ok(Some(Action::from("retry")))
                }
            }),
    ));
    let output = builder.add(writer("output", "printed", |_| Ok(json!(true))));
    builder
        .connect(generate, check)
        .connect_on(check, "retry", generate)
        .connect_on(check, "accept", output)
        .start(generate);
    let flow = builder.build()?;

    let mut store = SharedStore::new();
    flow.run_traced(&mut store, &mut ctx.timeline)?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DemoContext {
        DemoContext {
            config: EngineConfig::default(),
            timeline: ExecutionTimeline::new(),
        }
    }

    #[test]
    fn test_branch_demo() {
        let store = run_demo("branch", &mut ctx()).unwrap();
        assert_eq!(store.get::<String>("decision").unwrap(), "reject");
    }

    #[test]
    fn test_loop_demo_visits() {
        let mut ctx = ctx();
        let store = run_demo("loop", &mut ctx).unwrap();

        assert_eq!(store.get::<u64>("attempt").unwrap(), 3);
        assert_eq!(ctx.timeline.visit_count("generate"), 3);
        assert_eq!(ctx.timeline.visit_count("output"), 1);
    }

    #[test]
    fn test_nested_demo() {
        let store = run_demo("nested", &mut ctx()).unwrap();
        assert_eq!(
            store.get::<String>("result").unwrap(),
            "processed: graph-driven pipelines"
        );
    }

    #[test]
    fn test_chain_demo() {
        let store = run_demo("chain", &mut ctx()).unwrap();
        let article = store.get::<String>("article").unwrap();
        assert!(article.starts_with("Why step graphs: (polished)"));
        assert_eq!(article.lines().count(), 3);
    }

    #[test]
    fn test_retry_demo_succeeds_on_fourth_attempt() {
        let store = run_demo("retry", &mut ctx()).unwrap();
        assert_eq!(
            store.get::<String>("result").unwrap(),
            "processed 'explain quantum computing'"
        );
    }

    #[test]
    fn test_unknown_demo() {
        assert!(run_demo("nope", &mut ctx()).is_err());
    }
}
