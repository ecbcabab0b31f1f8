//! Gossip emission (§4.4): periodically ship a random fragment of the
//! last-contact matrix to a random neighbor.

use crate::matrix::LastContactMatrix;
use oxen_wire::{ContactCell, Sid};
use rand::seq::SliceRandom;
use rand::RngCore;

/// Tunables for gossip emission (§6).
#[derive(Debug, Clone)]
pub struct Config {
    pub period_ms: i64,
    /// Number of observed-columns to include per gossip round.
    pub fanout_columns: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            period_ms: 5_000,
            fanout_columns: 3,
        }
    }
}

/// Picks a random neighbor to gossip to and a random subset of columns to
/// gossip about, returning the `lc` fragment to send: the local row's
/// values for those columns plus any foreign rows touching them (§4.4).
///
/// Returns `None` if there is no known peer to gossip to yet.
pub fn build_gossip_round(
    local: &Sid,
    matrix: &LastContactMatrix,
    rng: &mut dyn RngCore,
    config: &Config,
) -> Option<(Sid, Vec<ContactCell>)> {
    let mut known: Vec<Sid> = matrix
        .known_sids()
        .into_iter()
        .filter(|sid| sid != local)
        .collect();
    known.sort();
    if known.is_empty() {
        return None;
    }

    let target = known.choose(rng)?.clone();

    let mut columns = known.clone();
    columns.shuffle(rng);
    columns.truncate(config.fanout_columns.max(1));
    let columns: std::collections::HashSet<Sid> = columns.into_iter().collect();

    let all_cells = matrix.as_contact_cells();
    let fragment: Vec<ContactCell> = all_cells
        .into_iter()
        .filter(|cell| columns.contains(&cell.observed))
        .collect();

    Some((target, fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn no_peers_means_no_gossip_round() {
        let matrix = LastContactMatrix::new();
        let mut rng = StdRng::seed_from_u64(1);
        let result = build_gossip_round(&Sid::from("a"), &matrix, &mut rng, &Config::default());
        assert!(result.is_none());
    }

    #[test]
    fn gossip_round_only_touches_selected_columns() {
        let mut matrix = LastContactMatrix::new();
        matrix.merge_gossip(&[
            ContactCell {
                observer: Sid::from("a"),
                observed: Sid::from("b"),
                timestamp: 10,
            },
            ContactCell {
                observer: Sid::from("a"),
                observed: Sid::from("c"),
                timestamp: 20,
            },
        ]);
        let mut rng = StdRng::seed_from_u64(42);
        let config = Config {
            period_ms: 5000,
            fanout_columns: 1,
        };
        let (_, fragment) =
            build_gossip_round(&Sid::from("a"), &matrix, &mut rng, &config).unwrap();
        assert_eq!(fragment.len(), 1);
    }
}
