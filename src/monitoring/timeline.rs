//! Execution Timeline
//!
//! Records when each step of a traced flow run starts and finishes.
//! Steps inside a cycle appear once per visit.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Step started
    Started,
    /// Step returned an action
    Completed,
    /// Step returned an error
    Failed,
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Name of the step
    pub step: String,
    /// Type of event
    pub event_type: EventType,
    /// When the event occurred
    pub timestamp: Instant,
}

/// Ordered record of step events for one or more flow runs.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event for a step.
    pub fn add_event(&mut self, step: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            step: step.into(),
            event_type,
            timestamp: Instant::now(),
        });
    }

    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Step names in the order they were started.
    pub fn visits(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.event_type == EventType::Started)
            .map(|e| e.step.as_str())
            .collect()
    }

    /// How many times a step was started.
    pub fn visit_count(&self, step: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type == EventType::Started && e.step == step)
            .count()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Total time spent in each step, summed over all visits, in milliseconds.
    pub fn get_durations(&self) -> HashMap<String, u128> {
        let mut open: Vec<(&str, Instant)> = Vec::new();
        let mut durations: HashMap<String, u128> = HashMap::new();

        for event in &self.events {
            match event.event_type {
                EventType::Started => {
                    open.push((event.step.as_str(), event.timestamp));
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = close_visit(&mut open, &event.step) {
                        *durations.entry(event.step.clone()).or_insert(0) +=
                            event.timestamp.duration_since(start).as_millis();
                    }
                }
            }
        }

        durations
    }

    /// Generates an ASCII Gantt chart, one row per visit.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = Instant::now().duration_since(self.start_time).as_millis();
        if total_time == 0 {
            return output;
        }

        // Scale to 50 characters width
        let scale = 50.0 / total_time as f64;
        let mut open: Vec<(&str, u128)> = Vec::new();

        for event in &self.events {
            let elapsed = event.timestamp.duration_since(self.start_time).as_millis();

            match event.event_type {
                EventType::Started => {
                    open.push((event.step.as_str(), elapsed));
                }
                EventType::Completed | EventType::Failed => {
                    let Some(start) = close_visit(&mut open, &event.step) else {
                        continue;
                    };
                    let start_pos = (start as f64 * scale) as usize;
                    let width = ((elapsed - start) as f64 * scale).max(1.0) as usize;
                    let marker = if event.event_type == EventType::Failed { "!" } else { "#" };

                    output.push_str(&format!(
                        "{:12} |{}{}| ({} ms)\n",
                        truncate(&event.step, 12),
                        " ".repeat(start_pos),
                        marker.repeat(width),
                        elapsed - start
                    ));
                }
            }
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes and returns the start of the innermost open visit of `step`.
///
/// Visits are matched last-in first-out, so a step that shares its name
/// with an enclosing flow closes its own interval, not the flow's.
fn close_visit<T>(open: &mut Vec<(&str, T)>, step: &str) -> Option<T> {
    let position = open.iter().rposition(|(name, _)| *name == step)?;
    Some(open.remove(position).1)
}

/// Pads or truncates a string to exactly `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
