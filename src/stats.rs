/// Diagnostic counters accumulated while loading the three dump
/// tables. Parse misses and join misses never abort a load; they land
/// here and are logged once per stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    /// Page rows dropped because a field failed to parse.
    pub page_rows_malformed: u64,
    /// Main-namespace linktarget rows seen.
    pub link_target_rows_parsed: u64,
    /// Linktarget rows dropped because a field failed to parse.
    pub link_target_rows_malformed: u64,
    /// Linktarget rows whose title matched no loaded page.
    pub link_target_title_misses: u64,
    /// Main-namespace pagelink rows seen.
    pub link_rows_parsed: u64,
    /// Pagelink rows dropped because a field failed to parse.
    pub link_rows_malformed: u64,
    /// Edges that resolved on both sides.
    pub links_inserted: u64,
    /// Pagelink rows whose source page id was unknown.
    pub link_from_misses: u64,
    /// Pagelink rows whose link target id was unknown.
    pub link_target_id_misses: u64,
}
