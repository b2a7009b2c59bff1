use tracing::span::{Attributes, Id};
use tracing::{field::Visit, Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

use chrono::{Local, Utc};
use console::{style, Term};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

#[derive(Debug, Clone)]
struct TraceNode {
    level: Level,
    name: String,
    parent_id: Option<Id>,
    children: Vec<Child>,
    module_path: Option<String>,
    line: Option<u32>,
    fields: Vec<(String, String)>,
    start_time: Option<Instant>,
    took: Option<u128>, // microseconds
}

#[derive(Debug, Clone)]
enum Child {
    Event(TraceNode),
    Span(Id),
}

impl Visit for TraceNode {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields
            .push((field.name().to_string(), value.to_string()));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.fields
            .push((field.name().to_string(), format!("{:?}", value)));
    }
}

impl TraceNode {
    fn new(
        level: Level,
        name: String,
        parent_id: Option<Id>,
        module_path: Option<String>,
        line: Option<u32>,
    ) -> Self {
        Self {
            level,
            name,
            parent_id,
            children: Vec::new(),
            module_path,
            line,
            fields: Vec::new(),
            start_time: None,
            took: None,
        }
    }

    fn is_span(&self) -> bool {
        self.took.is_some()
    }

    fn duration_text(&self) -> String {
        match self.took {
            Some(micros) if micros >= 1000 => format!("{}ms", micros / 1000),
            Some(micros) => format!("{}µs", micros),
            None => String::new(),
        }
    }

    fn styled_level(&self) -> String {
        let level = format!("{:>5}", self.level);
        match self.level {
            Level::ERROR => style(level).red().to_string(),
            Level::WARN => style(level).yellow().to_string(),
            Level::INFO => style(level).green().to_string(),
            _ => style(level).dim().to_string(),
        }
    }

    fn format_message(&self) -> String {
        let mut parts = Vec::new();

        if self.is_span() {
            parts.push(style(&self.name).cyan().to_string());
        }

        // message is printed bare, everything else as key=value
        if let Some((_, msg)) = self.fields.iter().find(|(k, _)| k == "message") {
            parts.push(style(msg).italic().to_string());
        }

        let fields: String = self
            .fields
            .iter()
            .filter(|(k, _)| k != "message")
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        if !fields.is_empty() {
            parts.push(fields);
        }

        parts.join(" ")
    }

    fn location(&self) -> String {
        match (&self.module_path, self.line) {
            (Some(module_path), Some(line)) => format!("{}:{}", module_path, line),
            (Some(module_path), None) => module_path.clone(),
            _ => String::new(),
        }
    }
}

/// Prints events to stderr as they arrive; spans are printed as a tree with
/// their elapsed time once the root span closes.
#[derive(Clone, Default)]
pub struct TreeLayer {
    spans: Arc<Mutex<HashMap<Id, TraceNode>>>,
}

impl TreeLayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn spans(&self) -> MutexGuard<'_, HashMap<Id, TraceNode>> {
        self.spans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn format_trace_node(&self, node: &TraceNode, depth: usize, is_last: bool) -> String {
        let now = Utc::now().with_timezone(&Local);
        let formatted_time = now.format("%H:%M:%S%.3f").to_string();
        let loc = node.location();

        let mut prefix = String::new();
        if depth > 0 {
            prefix.push_str(&"│   ".repeat(depth - 1));
            prefix.push_str(if is_last { "└─ " } else { "├─ " });
        }

        let mut message = format!(
            "{} {} {:>7} {}{}",
            style(formatted_time).dim(),
            node.styled_level(),
            node.duration_text(),
            prefix,
            node.format_message()
        );

        // right-align the source location
        let terminal_width = Term::stderr().size().1 as usize;
        let content_width =
            console::measure_text_width(&message) + console::measure_text_width(&loc);
        let padding = " ".repeat(terminal_width.saturating_sub(content_width + 1) + 1);
        message.push_str(&padding);
        message.push_str(&style(loc).dim().to_string());

        message
    }

    fn print_span_tree(&self, span_id: &Id, depth: usize, spans: &HashMap<Id, TraceNode>) {
        if let Some(node) = spans.get(span_id) {
            eprintln!("{}", self.format_trace_node(node, depth, false));
            let children_count = node.children.len();
            for (idx, child) in node.children.iter().enumerate() {
                let is_last = idx + 1 == children_count;
                match child {
                    Child::Event(event_node) => {
                        eprintln!("{}", self.format_trace_node(event_node, depth + 1, is_last));
                    }
                    Child::Span(child_id) => {
                        self.print_span_tree(child_id, depth + 1, spans);
                    }
                }
            }
        }
    }

    /// Removes a closed root span and everything below it.
    fn forget(&self, id: &Id, spans: &mut HashMap<Id, TraceNode>) {
        if let Some(node) = spans.remove(id) {
            for child in node.children {
                if let Child::Span(child_id) = child {
                    self.forget(&child_id, spans);
                }
            }
        }
    }
}

impl<S> Layer<S> for TreeLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_enter(&self, id: &Id, _ctx: Context<'_, S>) {
        if let Some(node) = self.spans().get_mut(id) {
            node.start_time = Some(Instant::now());
        }
    }

    fn on_exit(&self, id: &Id, _ctx: Context<'_, S>) {
        if let Some(node) = self.spans().get_mut(id) {
            if let Some(start_time) = node.start_time.take() {
                let elapsed = start_time.elapsed().as_micros();
                node.took = Some(node.took.unwrap_or(0) + elapsed);
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut event_node = TraceNode::new(
            *metadata.level(),
            metadata.name().to_string(),
            None,
            metadata.module_path().map(ToString::to_string),
            metadata.line(),
        );
        event.record(&mut event_node);

        let mut spans = self.spans();
        let parent = ctx
            .lookup_current()
            .and_then(|span| spans.get_mut(&span.id()));

        match parent {
            Some(parent_span) => parent_span.children.push(Child::Event(event_node)),
            None => eprintln!("{}", self.format_trace_node(&event_node, 0, true)),
        }
    }

    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let metadata = attrs.metadata();
        let parent_id = ctx.current_span().id().cloned();

        let mut node = TraceNode::new(
            *metadata.level(),
            metadata.name().to_string(),
            parent_id.clone(),
            metadata.module_path().map(ToString::to_string),
            metadata.line(),
        );
        node.took = Some(0);
        attrs.record(&mut node);

        let mut spans = self.spans();
        if let Some(parent_node) = parent_id.as_ref().and_then(|parent| spans.get_mut(parent)) {
            parent_node.children.push(Child::Span(id.clone()));
        }
        spans.insert(id.clone(), node);
    }

    fn on_close(&self, id: Id, _ctx: Context<'_, S>) {
        let mut spans = self.spans();
        let is_root = spans.get(&id).map(|node| node.parent_id.is_none());
        if is_root == Some(true) {
            self.print_span_tree(&id, 0, &spans);
            self.forget(&id, &mut spans);
        }
    }
}

/// Installs [`TreeLayer`] as the global subscriber, showing `level` and above.
///
/// Does nothing if a global subscriber is already set.
pub fn init(level: Level) {
    let layer = TreeLayer::new().with_filter(LevelFilter::from_level(level));
    let registry = Registry::default().with(layer);
    if tracing::subscriber::set_global_default(registry).is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        let mut node = TraceNode::new(
            Level::DEBUG,
            "event".into(),
            None,
            Some("grab::pipeline".into()),
            Some(12),
        );
        node.fields.push(("message".into(), "following redirect".into()));
        node.fields.push(("status".into(), "302".into()));
        node.fields.push(("to".into(), "http://example.test/b".into()));

        let message = console::strip_ansi_codes(&node.format_message()).to_string();
        assert_eq!(message, "following redirect status=302 to=http://example.test/b");
        assert_eq!(node.location(), "grab::pipeline:12");
        assert_eq!(node.duration_text(), "");
    }

    #[test]
    fn test_span_duration_text() {
        let mut node = TraceNode::new(Level::DEBUG, "grab".into(), None, None, None);
        node.took = Some(250);
        assert_eq!(node.duration_text(), "250µs");
        node.took = Some(12_345);
        assert_eq!(node.duration_text(), "12ms");
        assert_eq!(node.location(), "");
    }

    #[test]
    fn test_closed_root_span_is_forgotten() {
        let layer = TreeLayer::new();
        let subscriber = Registry::default().with(layer.clone());
        tracing::subscriber::with_default(subscriber, || {
            let root = tracing::info_span!("root");
            let _guard = root.enter();
            let child = tracing::info_span!("child");
            child.in_scope(|| tracing::info!(n = 1, "inside"));
        });
        assert!(layer.spans().is_empty());
    }
}
