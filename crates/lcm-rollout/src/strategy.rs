//! Upgrade strategies and the batch planner.

use std::collections::HashSet;

use lcm_state::Group;

/// How non-canary sites are grouped into batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum UpgradeStrategy {
    /// One site per batch. Default.
    #[default]
    Rolling,
    /// All remaining sites in a single batch.
    Parallel,
}

impl UpgradeStrategy {
    /// Interpret `upgradeStrategy.type`. Anything other than `Parallel`
    /// falls back to `Rolling`.
    pub fn from_type(value: &str) -> Self {
        if value == "Parallel" {
            Self::Parallel
        } else {
            Self::Rolling
        }
    }
}

/// One step of the rollout. Indices start at 1.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Batch {
    pub index: usize,
    pub sites: Vec<String>,
}

/// Partition `sites` into ordered batches.
///
/// Every canary, in order, becomes a singleton batch. Canaries need not be
/// listed in `sites`; they are resolved later, at synthesis time. The
/// remaining sites keep their order and form either one batch (`Parallel`,
/// omitted if empty) or one batch each (`Rolling`). A name listed twice is
/// placed once, at its first occurrence.
pub fn plan(sites: &[String], canaries: &[String], strategy: UpgradeStrategy) -> Vec<Batch> {
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut groups: Vec<Vec<String>> = Vec::new();

    for canary in canaries {
        if claimed.insert(canary.as_str()) {
            groups.push(vec![canary.clone()]);
        }
    }

    let remaining: Vec<String> = sites
        .iter()
        .filter(|site| claimed.insert(site.as_str()))
        .cloned()
        .collect();

    match strategy {
        UpgradeStrategy::Parallel => {
            if !remaining.is_empty() {
                groups.push(remaining);
            }
        }
        UpgradeStrategy::Rolling => {
            groups.extend(remaining.into_iter().map(|site| vec![site]));
        }
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(i, sites)| Batch {
            index: i + 1,
            sites,
        })
        .collect()
}

/// Plan a group's batches from its spec.
pub fn plan_for(group: &Group) -> Vec<Batch> {
    plan(
        &group.spec.sites,
        &group.spec.canaries,
        UpgradeStrategy::from_type(&group.spec.upgrade_strategy.kind),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn shape(batches: &[Batch]) -> Vec<Vec<&str>> {
        batches
            .iter()
            .map(|b| b.sites.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn rolling_with_canary() {
        let batches = plan(&names(&["a", "b", "c"]), &names(&["a"]), UpgradeStrategy::Rolling);
        assert_eq!(shape(&batches), vec![vec!["a"], vec!["b"], vec!["c"]]);
        assert_eq!(
            batches.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn parallel_with_canary() {
        let batches = plan(&names(&["a", "b", "c"]), &names(&["a"]), UpgradeStrategy::Parallel);
        assert_eq!(shape(&batches), vec![vec!["a"], vec!["b", "c"]]);
    }

    #[test]
    fn parallel_without_canaries_is_one_batch() {
        let sites = names(&["x", "y", "z"]);
        let batches = plan(&sites, &[], UpgradeStrategy::Parallel);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].sites, sites);
    }

    #[test]
    fn rolling_without_canaries_is_one_batch_per_site() {
        let batches = plan(&names(&["x", "y", "z"]), &[], UpgradeStrategy::Rolling);
        assert_eq!(shape(&batches), vec![vec!["x"], vec!["y"], vec!["z"]]);
    }

    #[test]
    fn parallel_all_canaries_emits_no_trailing_batch() {
        let batches = plan(&names(&["a", "b"]), &names(&["b", "a"]), UpgradeStrategy::Parallel);
        assert_eq!(shape(&batches), vec![vec!["b"], vec!["a"]]);
    }

    #[test]
    fn empty_group_has_no_batches() {
        assert!(plan(&[], &[], UpgradeStrategy::Parallel).is_empty());
        assert!(plan(&[], &[], UpgradeStrategy::Rolling).is_empty());
    }

    #[test]
    fn unknown_canary_still_gets_a_batch() {
        let batches = plan(&names(&["a", "b"]), &names(&["ghost"]), UpgradeStrategy::Parallel);
        assert_eq!(shape(&batches), vec![vec!["ghost"], vec!["a", "b"]]);
    }

    #[test]
    fn canaries_keep_declared_order() {
        let batches = plan(
            &names(&["a", "b", "c", "d"]),
            &names(&["c", "a"]),
            UpgradeStrategy::Rolling,
        );
        assert_eq!(shape(&batches), vec![vec!["c"], vec!["a"], vec!["b"], vec!["d"]]);
    }

    #[test]
    fn duplicates_are_placed_once() {
        let batches = plan(
            &names(&["a", "b", "a", "c"]),
            &names(&["c", "c"]),
            UpgradeStrategy::Rolling,
        );
        assert_eq!(shape(&batches), vec![vec!["c"], vec!["a"], vec!["b"]]);
    }

    #[test]
    fn every_site_lands_in_exactly_one_batch() {
        let sites = names(&["s1", "s2", "s3", "s4", "s5", "s6"]);
        let canaries = names(&["s4", "s2"]);
        for strategy in [UpgradeStrategy::Rolling, UpgradeStrategy::Parallel] {
            let batches = plan(&sites, &canaries, strategy);

            // Canaries lead as singletons.
            assert_eq!(batches[0].sites, vec!["s4"]);
            assert_eq!(batches[1].sites, vec!["s2"]);

            let mut seen: Vec<&str> = batches
                .iter()
                .flat_map(|b| b.sites.iter().map(String::as_str))
                .collect();
            assert!(batches.iter().all(|b| !b.sites.is_empty()));
            seen.sort_unstable();
            assert_eq!(seen, vec!["s1", "s2", "s3", "s4", "s5", "s6"]);
        }
    }

    #[test]
    fn planning_is_deterministic() {
        let sites = names(&["m", "k", "z", "a"]);
        let canaries = names(&["z"]);
        let first = plan(&sites, &canaries, UpgradeStrategy::Rolling);
        let second = plan(&sites, &canaries, UpgradeStrategy::Rolling);
        assert_eq!(first, second);
    }

    #[test]
    fn strategy_from_type() {
        assert_eq!(UpgradeStrategy::from_type("Parallel"), UpgradeStrategy::Parallel);
        assert_eq!(UpgradeStrategy::from_type("Rolling"), UpgradeStrategy::Rolling);
        assert_eq!(UpgradeStrategy::from_type(""), UpgradeStrategy::Rolling);
        assert_eq!(UpgradeStrategy::from_type("parallel"), UpgradeStrategy::Rolling);
        assert_eq!(UpgradeStrategy::default(), UpgradeStrategy::Rolling);
    }
}
