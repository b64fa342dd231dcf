/// A main-namespace article. The page's position in the dense page
/// vector is its identity everywhere after ingestion; the MediaWiki
/// page id is only used while edges resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Title with underscores already decoded to spaces.
    pub title: String,
    pub is_redirect: bool,
}

/// A resolved edge between two page indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub from: u32,
    pub to: u32,
}

/// Position within an input stream, in compressed bytes. The graph
/// build stage reuses the same pair to carry edge counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadProgress {
    pub total_bytes: u64,
    pub current_bytes: u64,
}
