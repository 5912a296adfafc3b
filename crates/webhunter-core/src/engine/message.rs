//! Notification composition
//!
//! Pure functions: given the novel items of one cycle, build the single
//! message that goes out to every comm.

use crate::config::MessageStrings;
use crate::error::Error;
use crate::registry::PluginName;
use crate::traits::Item;

/// Lines of error chain kept in a failure notice
const NOTICE_TRACE_LINES: usize = 3;

/// Novel items contributed by one source in one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItems {
    /// Source identity (type name)
    pub source: String,
    /// Novel items, in fetch order
    pub items: Vec<Item>,
}

/// A composed notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Representative link
    pub url: Option<String>,
    /// Total number of novel items
    pub count: usize,
    /// Contributing sources, deduplicated, in encounter order
    pub sources: Vec<String>,
}

/// Build the notification for a cycle
///
/// Returns `None` when no source contributed anything.
pub fn compose(
    novel: &[SourceItems],
    strings: &MessageStrings,
    priority: Option<&PluginName>,
) -> Option<Notification> {
    let count: usize = novel.iter().map(|group| group.items.len()).sum();
    if count == 0 {
        return None;
    }

    let mut sources: Vec<String> = Vec::new();
    for group in novel.iter().filter(|group| !group.items.is_empty()) {
        if !sources.contains(&group.source) {
            sources.push(group.source.clone());
        }
    }
    let joined = sources.join(", ");

    let (title, body) = if count == 1 {
        (
            strings.default_title.clone(),
            MessageStrings::render(&strings.new_item_text, count, &joined),
        )
    } else {
        (
            strings.default_title_plural.clone(),
            MessageStrings::render(&strings.new_items_text, count, &joined),
        )
    };

    Some(Notification {
        title,
        body,
        url: representative(novel, priority).map(|item| item.url.clone()),
        count,
        sources,
    })
}

/// Pick the item whose link goes into the notification
///
/// The priority source's first item wins when that source contributed;
/// otherwise the first item of the first contributing source.
pub fn representative<'a>(
    novel: &'a [SourceItems],
    priority: Option<&PluginName>,
) -> Option<&'a Item> {
    let preferred = priority.and_then(|priority| {
        novel
            .iter()
            .filter(|group| priority.matches(&group.source))
            .find_map(|group| group.items.first())
    });

    preferred.or_else(|| novel.iter().find_map(|group| group.items.first()))
}

/// Collapse a multi-line message for single-line log output
pub fn one_line(msg: &str) -> String {
    msg.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("|\t")
}

/// Diagnostic sent to every comm when the scheduler loop dies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    /// Error kind, e.g. `StorageError` or `panic`
    pub category: String,
    /// Truncated error chain or panic message
    pub trace: String,
}

impl FailureNotice {
    /// Describe an error and up to two of its causes
    pub fn from_error(err: &Error) -> Self {
        let mut lines = vec![err.to_string()];
        let mut cause = std::error::Error::source(err);
        while let Some(inner) = cause {
            if lines.len() >= NOTICE_TRACE_LINES {
                break;
            }
            lines.push(format!("caused by: {}", inner));
            cause = inner.source();
        }

        Self {
            category: err.category().to_string(),
            trace: lines.join("\n"),
        }
    }

    /// Describe a panic payload
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());

        Self {
            category: "panic".to_string(),
            trace: message
                .lines()
                .take(NOTICE_TRACE_LINES)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Full message text, prefixed by the configured shutdown text
    pub fn render(&self, shutdown_text: &str) -> String {
        format!("{}\n\n{}:\n{}", shutdown_text, self.category, self.trace)
    }
}
