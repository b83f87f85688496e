//! Identity resolution for one side of one snapshot.
//!
//! [`resolve_side`] is a pure function from (active entities, remembered
//! entities, observations) to a set of decisions. It mutates nothing; the
//! engine applies the decisions afterwards.
//!
//! # Matching rule
//!
//! An observation matches a candidate when both relative differences are
//! within tolerance, measured against the candidate's most recent values:
//!
//! ```text
//! |p_obs - p_cand| / p_cand <= price_tolerance
//! |s_obs - s_cand| / s_cand <= size_tolerance
//! ```
//!
//! Active entities are matched first. Observations left over are matched
//! against the disappeared memory (with tolerances scaled by the reappear
//! factor). Anything still unmatched becomes a new entity; active entities
//! with no match disappear.
//!
//! Within each pass the assignment is greedy and one-to-one over all
//! admissible pairs, ordered by:
//! 1. smaller relative price deviation
//! 2. older candidate (earlier first sight)
//! 3. lower entity id
//! 4. lower depth index of the observation
//!
//! The order is total, so the result does not depend on input order.

use super::entity::EntityId;
use super::scanner::Observation;
use crate::config::DetectionPolicy;

/// The values of an entity that matching looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: EntityId,
    /// Most recent price (fixed-point)
    pub price: i64,
    /// Most recent size
    pub size: f64,
    /// First-seen timestamp, for age tie-breaks
    pub first_seen: i64,
}

/// Relative tolerances for one matching pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub price: f64,
    pub size: f64,
}

impl Tolerance {
    /// Tolerances for matching against active entities.
    pub fn active(policy: &DetectionPolicy) -> Self {
        Self {
            price: policy.price_tolerance,
            size: policy.size_tolerance,
        }
    }

    /// Tolerances for matching against the disappeared memory.
    pub fn reappear(policy: &DetectionPolicy) -> Self {
        Self::active(policy).scaled(policy.reappear_tolerance_factor)
    }

    /// Multiply both tolerances.
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            price: self.price * factor,
            size: self.size * factor,
        }
    }

    /// Relative price deviation if the pair is admissible.
    #[inline]
    pub fn deviation(&self, candidate: &Candidate, obs: &Observation) -> Option<f64> {
        if candidate.price <= 0 || candidate.size <= 0.0 {
            return None;
        }
        let price_dev = (obs.price - candidate.price).abs() as f64 / candidate.price as f64;
        let size_dev = (obs.size - candidate.size).abs() / candidate.size;

        (price_dev <= self.price && size_dev <= self.size).then_some(price_dev)
    }
}

/// Decision for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Continues an active entity
    Continued(EntityId),
    /// Rematched a disappeared entity
    Reappeared(EntityId),
    /// No match: start a new entity
    New,
}

/// All decisions for one side of one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideResolution {
    /// One entry per observation, in observation order
    pub assignments: Vec<Assignment>,

    /// Active entities with no match, ascending id
    pub disappeared: Vec<EntityId>,
}

impl SideResolution {
    pub fn continued_count(&self) -> usize {
        self.count(|a| matches!(a, Assignment::Continued(_)))
    }

    pub fn reappeared_count(&self) -> usize {
        self.count(|a| matches!(a, Assignment::Reappeared(_)))
    }

    pub fn new_count(&self) -> usize {
        self.count(|a| matches!(a, Assignment::New))
    }

    fn count(&self, pred: impl Fn(&Assignment) -> bool) -> usize {
        self.assignments.iter().filter(|a| pred(a)).count()
    }
}

/// Resolve one side.
///
/// `active` and `memory` must contain only entities of the observations'
/// side. Each candidate is used at most once and each observation is
/// assigned exactly once.
pub fn resolve_side(
    active: &[Candidate],
    memory: &[Candidate],
    observations: &[Observation],
    active_tolerance: Tolerance,
    reappear_tolerance: Tolerance,
) -> SideResolution {
    let mut assignments: Vec<Option<Assignment>> = vec![None; observations.len()];

    let all: Vec<usize> = (0..observations.len()).collect();
    let (continued, active_used) = greedy_match(active, observations, &all, active_tolerance);
    for (obs_idx, id) in continued {
        assignments[obs_idx] = Some(Assignment::Continued(id));
    }

    let leftover: Vec<usize> = all
        .iter()
        .copied()
        .filter(|&i| assignments[i].is_none())
        .collect();
    let (reappeared, _) = greedy_match(memory, observations, &leftover, reappear_tolerance);
    for (obs_idx, id) in reappeared {
        assignments[obs_idx] = Some(Assignment::Reappeared(id));
    }

    let mut disappeared: Vec<EntityId> = active
        .iter()
        .zip(active_used.iter())
        .filter(|(_, used)| !**used)
        .map(|(cand, _)| cand.id)
        .collect();
    disappeared.sort_unstable();

    SideResolution {
        assignments: assignments
            .into_iter()
            .map(|a| a.unwrap_or(Assignment::New))
            .collect(),
        disappeared,
    }
}

/// Greedy one-to-one matching of `obs_indices` against `candidates`.
///
/// Returns the (observation index, entity id) pairs and a per-candidate
/// "used" mask.
fn greedy_match(
    candidates: &[Candidate],
    observations: &[Observation],
    obs_indices: &[usize],
    tolerance: Tolerance,
) -> (Vec<(usize, EntityId)>, Vec<bool>) {
    struct Pair {
        deviation: f64,
        cand: usize,
        obs: usize,
    }

    let mut pairs = Vec::new();
    for &obs in obs_indices {
        for (cand, candidate) in candidates.iter().enumerate() {
            if let Some(deviation) = tolerance.deviation(candidate, &observations[obs]) {
                pairs.push(Pair { deviation, cand, obs });
            }
        }
    }

    pairs.sort_by(|a, b| {
        let (ca, cb) = (&candidates[a.cand], &candidates[b.cand]);
        a.deviation
            .total_cmp(&b.deviation)
            .then_with(|| ca.first_seen.cmp(&cb.first_seen))
            .then_with(|| ca.id.cmp(&cb.id))
            .then_with(|| observations[a.obs].depth.cmp(&observations[b.obs].depth))
            .then_with(|| a.obs.cmp(&b.obs))
    });

    let mut cand_used = vec![false; candidates.len()];
    let mut obs_used = vec![false; observations.len()];
    let mut matches = Vec::new();

    for pair in pairs {
        if cand_used[pair.cand] || obs_used[pair.obs] {
            continue;
        }
        cand_used[pair.cand] = true;
        obs_used[pair.obs] = true;
        matches.push((pair.obs, candidates[pair.cand].id));
    }

    (matches, cand_used)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::scanner::WhaleTier;
    use crate::types::{price_from_f64, Side};

    fn obs(price: f64, size: f64, depth: usize) -> Observation {
        Observation {
            side: Side::Bid,
            price: price_from_f64(price),
            size,
            notional: price * size,
            depth,
            timestamp: 0,
            book_share: 0.0,
            tier: WhaleTier::Whale,
        }
    }

    fn cand(id: u64, price: f64, size: f64, first_seen: i64) -> Candidate {
        Candidate {
            id: EntityId(id),
            price: price_from_f64(price),
            size,
            first_seen,
        }
    }

    fn tol() -> Tolerance {
        Tolerance::active(&DetectionPolicy::default())
    }

    #[test]
    fn test_deviation_bounds() {
        let t = tol();
        let c = cand(1, 100.0, 1_000.0, 0);
        assert!(t.deviation(&c, &obs(100.05, 1_000.0, 0)).is_some());
        assert!(t.deviation(&c, &obs(100.2, 1_000.0, 0)).is_none());
        assert!(t.deviation(&c, &obs(100.0, 1_190.0, 0)).is_some());
        assert!(t.deviation(&c, &obs(100.0, 1_300.0, 0)).is_none());
        assert!(t.deviation(&c, &obs(100.0, 790.0, 0)).is_none());
    }

    #[test]
    fn test_continue_new_and_disappear() {
        let active = [cand(1, 100.0, 1_000.0, 0), cand(2, 90.0, 5_000.0, 0)];
        let observations = [obs(100.0, 1_050.0, 0), obs(80.0, 2_000.0, 3)];

        let res = resolve_side(&active, &[], &observations, tol(), tol());
        assert_eq!(
            res.assignments,
            vec![Assignment::Continued(EntityId(1)), Assignment::New]
        );
        assert_eq!(res.disappeared, vec![EntityId(2)]);
        assert_eq!(res.continued_count(), 1);
        assert_eq!(res.new_count(), 1);
    }

    #[test]
    fn test_active_matched_before_memory() {
        let active = [cand(1, 100.0, 1_000.0, 10)];
        let memory = [cand(2, 100.0, 1_000.0, 0)];
        let observations = [obs(100.0, 1_000.0, 0)];

        let res = resolve_side(&active, &memory, &observations, tol(), tol());
        assert_eq!(res.assignments, vec![Assignment::Continued(EntityId(1))]);
        assert!(res.disappeared.is_empty());
    }

    #[test]
    fn test_reappearance_from_memory() {
        let memory = [cand(5, 100.0, 1_000.0, 0)];
        let observations = [obs(100.0, 1_000.0, 1)];

        let res = resolve_side(&[], &memory, &observations, tol(), tol());
        assert_eq!(res.assignments, vec![Assignment::Reappeared(EntityId(5))]);
        assert_eq!(res.reappeared_count(), 1);
    }

    #[test]
    fn test_reappear_factor_widens_memory_match() {
        let memory = [cand(5, 100.0, 1_000.0, 0)];
        let observations = [obs(100.0, 1_300.0, 0)];
        let policy = DetectionPolicy::default().with_reappear_tolerance_factor(2.0);

        let strict = resolve_side(&[], &memory, &observations, tol(), tol());
        assert_eq!(strict.assignments, vec![Assignment::New]);

        let wide = resolve_side(&[], &memory, &observations, tol(), Tolerance::reappear(&policy));
        assert_eq!(wide.assignments, vec![Assignment::Reappeared(EntityId(5))]);
    }

    #[test]
    fn test_one_to_one_prefers_smaller_price_deviation() {
        // Both observations fit the single candidate; the closer one wins.
        let active = [cand(1, 100.0, 1_000.0, 0)];
        let observations = [obs(100.08, 1_000.0, 0), obs(100.01, 1_000.0, 1)];

        let res = resolve_side(&active, &[], &observations, tol(), tol());
        assert_eq!(
            res.assignments,
            vec![Assignment::New, Assignment::Continued(EntityId(1))]
        );
    }

    #[test]
    fn test_tie_prefers_older_entity() {
        let active = [cand(2, 100.0, 1_000.0, 50), cand(1, 100.0, 1_000.0, 10)];
        let observations = [obs(100.0, 1_000.0, 0)];

        let res = resolve_side(&active, &[], &observations, tol(), tol());
        assert_eq!(res.assignments, vec![Assignment::Continued(EntityId(1))]);
        assert_eq!(res.disappeared, vec![EntityId(2)]);
    }

    #[test]
    fn test_tie_prefers_lower_id_then_depth() {
        let active = [cand(9, 100.0, 1_000.0, 0), cand(4, 100.0, 1_000.0, 0)];
        let observations = [obs(100.0, 1_000.0, 5), obs(100.0, 1_000.0, 2)];

        let res = resolve_side(&active, &[], &observations, tol(), tol());
        // id 4 claims the shallower observation, id 9 the other one
        assert_eq!(
            res.assignments,
            vec![
                Assignment::Continued(EntityId(9)),
                Assignment::Continued(EntityId(4))
            ]
        );
    }

    #[test]
    fn test_order_independent() {
        let a = [cand(1, 100.0, 1_000.0, 0), cand(2, 100.05, 1_000.0, 5)];
        let b = [a[1], a[0]];
        let observations = [obs(100.02, 1_000.0, 0), obs(100.06, 1_000.0, 1)];

        let ra = resolve_side(&a, &[], &observations, tol(), tol());
        let rb = resolve_side(&b, &[], &observations, tol(), tol());
        assert_eq!(ra, rb);
    }

    #[test]
    fn test_empty_observations_disappear_everything() {
        let active = [cand(3, 100.0, 1_000.0, 0), cand(1, 90.0, 1_000.0, 0)];
        let res = resolve_side(&active, &[], &[], tol(), tol());
        assert!(res.assignments.is_empty());
        assert_eq!(res.disappeared, vec![EntityId(1), EntityId(3)]);
    }
}
