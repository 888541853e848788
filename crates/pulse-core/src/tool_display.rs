//! Display metadata for tool pills.
//!
//! The table is built once and passed to whatever renders the session; it is
//! never mutated afterwards. Unknown tool names resolve to the fallback entry.

use std::collections::HashMap;

use serde::Serialize;

use crate::event::ToolEventRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Search,
    Content,
    Review,
    Image,
    Other,
}

impl ToolCategory {
    pub const ORDER: [ToolCategory; 5] = [
        ToolCategory::Search,
        ToolCategory::Content,
        ToolCategory::Review,
        ToolCategory::Image,
        ToolCategory::Other,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            ToolCategory::Search => "Search",
            ToolCategory::Content => "Content",
            ToolCategory::Review => "Review",
            ToolCategory::Image => "Image",
            ToolCategory::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDisplay {
    pub icon: String,
    pub label: String,
    pub category: ToolCategory,
}

impl ToolDisplay {
    pub fn new(icon: impl Into<String>, label: impl Into<String>, category: ToolCategory) -> Self {
        Self {
            icon: icon.into(),
            label: label.into(),
            category,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolDisplayTable {
    entries: HashMap<String, ToolDisplay>,
    fallback: ToolDisplay,
}

impl Default for ToolDisplayTable {
    fn default() -> Self {
        Self::empty()
            .with_entry("web_search", ToolDisplay::new("🔍", "Web search", ToolCategory::Search))
            .with_entry("file_search", ToolDisplay::new("📂", "File search", ToolCategory::Search))
            .with_entry(
                "search_knowledge_base",
                ToolDisplay::new("📚", "Knowledge base", ToolCategory::Search),
            )
            .with_entry("mcp_search", ToolDisplay::new("📖", "Microsoft Learn", ToolCategory::Search))
            .with_entry(
                "generate_content",
                ToolDisplay::new("✍️", "Content generation", ToolCategory::Content),
            )
            .with_entry("review_content", ToolDisplay::new("🧐", "Content review", ToolCategory::Review))
            .with_entry("generate_image", ToolDisplay::new("🎨", "Image generation", ToolCategory::Image))
    }
}

impl ToolDisplayTable {
    /// A table with no entries; every tool resolves to the fallback.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            fallback: ToolDisplay::new("🔧", "Tool", ToolCategory::Other),
        }
    }

    pub fn with_entry(mut self, tool: impl Into<String>, display: ToolDisplay) -> Self {
        self.entries.insert(tool.into(), display);
        self
    }

    pub fn with_fallback(mut self, fallback: ToolDisplay) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn lookup(&self, tool: &str) -> &ToolDisplay {
        self.entries.get(tool).unwrap_or(&self.fallback)
    }

    /// Configured label, or the raw tool name for unknown tools.
    pub fn label<'a>(&'a self, tool: &'a str) -> &'a str {
        self.entries
            .get(tool)
            .map(|display| display.label.as_str())
            .unwrap_or(tool)
    }

    pub fn is_known(&self, tool: &str) -> bool {
        self.entries.contains_key(tool)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolGroup {
    pub category: ToolCategory,
    pub records: Vec<ToolEventRecord>,
}

/// Group a tool snapshot by category, keeping snapshot order inside each
/// group. Empty groups are omitted.
pub fn group_by_category(records: &[ToolEventRecord], table: &ToolDisplayTable) -> Vec<ToolGroup> {
    ToolCategory::ORDER
        .into_iter()
        .filter_map(|category| {
            let records: Vec<_> = records
                .iter()
                .filter(|r| table.lookup(&r.tool).category == category)
                .cloned()
                .collect();
            (!records.is_empty()).then_some(ToolGroup { category, records })
        })
        .collect()
}
