//! Choosing which listed entries a run acts on.

use crate::afc::FileTransfer;
use crate::error::StatError;
use crate::listing::is_dot_marker;
use crate::metadata::attributes_of;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectMode {
    /// Every matching entry, in listing order
    All,
    /// Only the newest matching entry
    Latest,
}

/// One listed entry. Size and creation time stay `None` until fetched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub size: Option<u64>,
    pub created_at: Option<u64>,
    pub is_match: bool,
}

impl RemoteEntry {
    pub fn unfetched(name: &str, is_match: bool) -> Self {
        Self {
            name: name.to_string(),
            size: None,
            created_at: None,
            is_match,
        }
    }
}

/// Case-sensitive substring match. Dot markers never match.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    !is_dot_marker(name) && name.contains(pattern)
}

/// Index of the entry with the greatest creation time.
///
/// Only a strictly greater time displaces the current pick, so ties resolve
/// to the first entry seen with that time. An entry without a time ranks
/// below any entry with one.
pub fn pick_latest<I>(created: I) -> Option<usize>
where
    I: IntoIterator<Item = Option<u64>>,
{
    let mut best: Option<(usize, Option<u64>)> = None;
    for (idx, ts) in created.into_iter().enumerate() {
        match best {
            Some((_, best_ts)) if ts <= best_ts => {}
            _ => best = Some((idx, ts)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Select entries of `names` matching `pattern`.
///
/// `All` needs no metadata. `Latest` stats every match to rank it; a match
/// that vanished in the meantime is reported as `StatError`.
pub fn select<F: FileTransfer + ?Sized>(
    files: &mut F,
    names: &[String],
    pattern: &str,
    mode: SelectMode,
) -> Result<Vec<RemoteEntry>, StatError> {
    let matched = names.iter().filter(|n| matches_pattern(n, pattern));

    match mode {
        SelectMode::All => Ok(matched.map(|n| RemoteEntry::unfetched(n, true)).collect()),
        SelectMode::Latest => {
            let mut candidates = Vec::new();
            for name in matched {
                let attrs = attributes_of(files, name)?;
                candidates.push(RemoteEntry {
                    name: name.clone(),
                    size: attrs.size(),
                    created_at: attrs.created_at(),
                    is_match: true,
                });
            }
            let newest = pick_latest(candidates.iter().map(|c| c.created_at));
            Ok(newest
                .map(|idx| candidates.swap_remove(idx))
                .into_iter()
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFs;

    fn names(fs: &mut MemoryFs) -> Vec<String> {
        crate::listing::list(fs, ".").unwrap()
    }

    #[test]
    fn ties_go_to_first_seen() {
        assert_eq!(pick_latest([Some(5), Some(9), Some(9), Some(3)]), Some(1));
    }

    #[test]
    fn missing_time_ranks_lowest() {
        assert_eq!(pick_latest([None, Some(0), None]), Some(1));
        assert_eq!(pick_latest([None, None]), Some(0));
        assert_eq!(pick_latest(std::iter::empty()), None);
    }

    #[test]
    fn latest_picks_first_of_tied_newest() {
        let mut fs = MemoryFs::new()
            .with_report("panic-1.ips", b"1", 5)
            .with_report("panic-2.ips", b"22", 9)
            .with_report("panic-3.ips", b"333", 9)
            .with_report("panic-4.ips", b"4444", 3);
        let listed = names(&mut fs);

        let picked = select(&mut fs, &listed, "panic", SelectMode::Latest).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name, "panic-2.ips");
        assert_eq!(picked[0].created_at, Some(9));
        assert_eq!(picked[0].size, Some(2));
    }

    #[test]
    fn all_keeps_listing_order_without_stat() {
        let mut fs = MemoryFs::new()
            .with_report("panic-z.ips", b"z", 1)
            .with_report("Jetsam.ips", b"j", 2)
            .with_report("panic-a.ips", b"a", 3);
        let listed = names(&mut fs);

        let picked = select(&mut fs, &listed, "panic", SelectMode::All).unwrap();
        let picked: Vec<_> = picked.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(picked, vec!["panic-z.ips", "panic-a.ips"]);
        assert_eq!(fs.stat_calls, 0);
    }

    #[test]
    fn no_match_is_empty_not_error() {
        let mut fs = MemoryFs::new().with_report("Jetsam.ips", b"j", 2);
        let listed = names(&mut fs);
        for mode in [SelectMode::All, SelectMode::Latest] {
            assert!(select(&mut fs, &listed, "panic", mode).unwrap().is_empty());
        }
    }

    #[test]
    fn pattern_is_case_sensitive_and_skips_markers() {
        assert!(matches_pattern("panic-full.ips", "panic"));
        assert!(!matches_pattern("Panic-full.ips", "panic"));
        assert!(!matches_pattern(".", ""));
        assert!(!matches_pattern("..", "."));
        assert!(matches_pattern("a.ips", ""));
    }

    #[test]
    fn vanished_candidate_is_stat_error() {
        let mut fs = MemoryFs::new().with_report("panic-1.ips", b"1", 5);
        let listed = vec!["panic-1.ips".to_string(), "panic-ghost.ips".to_string()];
        let err = select(&mut fs, &listed, "panic", SelectMode::Latest).unwrap_err();
        assert_eq!(err.name, "panic-ghost.ips");
    }
}
