use crate::gesture::extract::HandMetrics;

/// The winning hand of a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DominantHand {
    /// Position of the hand in detector order.
    pub index: usize,
    pub metrics: HandMetrics,
}

/// Pick the hand with the strictly greatest primary spread.
///
/// The running maximum starts at 0 and comparison is strict, so a hand with
/// zero spread never wins and among equal spreads the first hand in
/// iteration order wins. Hands without metrics (degenerate observations) are
/// skipped but still count toward `index`. Returns `None` when no hand has a
/// positive spread.
pub fn select_dominant<I>(hands: I) -> Option<DominantHand>
where
    I: IntoIterator<Item = Option<HandMetrics>>,
{
    let mut best: Option<DominantHand> = None;
    for (index, metrics) in hands.into_iter().enumerate() {
        let Some(metrics) = metrics else {
            continue;
        };
        let floor = best
            .as_ref()
            .map_or(0.0, |current| current.metrics.primary().spread);
        if metrics.primary().spread > floor {
            best = Some(DominantHand { index, metrics });
        }
    }
    best
}
