//! Best-observation selection (lower is better).

use mb_types::Observation;
use std::cmp::Ordering;

fn by_value(a: &Observation, b: &Observation) -> Ordering {
    match a.value.partial_cmp(&b.value) {
        Some(ordering) => ordering,
        // NaN ranks after every number.
        None => a.value.is_nan().cmp(&b.value.is_nan()),
    }
}

/// Observations sorted by value ascending. The sort is stable, so equal
/// values keep their insertion order.
pub fn rank_observations<'a, I>(observations: I) -> Vec<&'a Observation>
where
    I: IntoIterator<Item = &'a Observation>,
{
    let mut ranked: Vec<&Observation> = observations.into_iter().collect();
    ranked.sort_by(|a, b| by_value(a, b));
    ranked
}

/// The observation with the lowest value; the earliest one wins ties.
pub fn select_best<'a, I>(observations: I) -> Option<&'a Observation>
where
    I: IntoIterator<Item = &'a Observation>,
{
    observations.into_iter().fold(None, |best, candidate| match best {
        Some(current) if !candidate.improves_on(current) => Some(current),
        _ => Some(candidate),
    })
}
