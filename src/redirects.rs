//! Redirect table parsing.
//!
//! The content repository ships a line-oriented redirect file mapping retired
//! document paths to their successors. Only lines of the shape
//! `<source>\t<target>` with a `/`-rooted source are meaningful; everything
//! else (comments, headers, blank lines) is dropped without error.

use std::collections::BTreeMap;

/// Mapping from source path to target path. Later duplicates win.
pub type RedirectTable = BTreeMap<String, String>;

/// Parses raw redirect text into a table.
///
/// Total: malformed lines are dropped, never errored. A line is kept iff it
/// starts with `/` and contains a tab; of the kept line, the first two
/// tab-delimited fields become (source, target), and a line with an empty
/// field is dropped too.
pub fn parse(raw: &str) -> RedirectTable {
    let mut table = RedirectTable::new();
    for line in raw.lines() {
        if !line.starts_with('/') {
            continue;
        }
        let Some((source, rest)) = line.split_once('\t') else {
            continue;
        };
        let target = match rest.split_once('\t') {
            Some((target, _)) => target,
            None => rest,
        };
        if source.is_empty() || target.is_empty() {
            continue;
        }
        table.insert(source.to_string(), target.to_string());
    }
    table
}
