//! Knuth–Plass optimal paragraph breaking over a box/glue/penalty stream.

use crate::config::JustificationConfig;

/// Penalties at or above this never break; at or below its negation always do.
pub const INFINITE_PENALTY: f64 = 10_000.0;
/// Stretch of the paragraph-final fill glue.
pub const FILL_STRETCH: f64 = 1.0e6;
/// Adjustment ratios are clamped to this; an underfull line with no stretch
/// reports it.
pub const MAX_RATIO: f64 = 10.0;
/// Cap on line badness.
pub const MAX_BADNESS: f64 = 10_000.0;

/// One element of the item stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Item {
    /// Unbreakable content.
    Box { width: f64 },
    /// Breakable space.
    Glue { width: f64, stretch: f64, shrink: f64 },
    /// Break opportunity with a cost; `width` is added only if broken here.
    Penalty { width: f64, penalty: f64, flagged: bool },
}

impl Item {
    pub fn boxed(width: f64) -> Self {
        Self::Box { width }
    }

    pub fn glue(width: f64, stretch: f64, shrink: f64) -> Self {
        Self::Glue {
            width,
            stretch,
            shrink,
        }
    }

    pub fn penalty(width: f64, penalty: f64, flagged: bool) -> Self {
        Self::Penalty {
            width,
            penalty,
            flagged,
        }
    }

    /// Infinitely stretchable glue closing a paragraph.
    pub fn fill() -> Self {
        Self::glue(0.0, FILL_STRETCH, 0.0)
    }

    pub fn forced_break() -> Self {
        Self::penalty(0.0, -INFINITE_PENALTY, false)
    }

    pub fn is_forced_break(&self) -> bool {
        matches!(self, Self::Penalty { penalty, .. } if *penalty <= -INFINITE_PENALTY)
    }
}

/// Coarse adjustment bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fitness {
    Tight = 0,
    Normal = 1,
    Loose = 2,
    VeryLoose = 3,
}

impl Fitness {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < -0.5 {
            Self::Tight
        } else if ratio <= 0.5 {
            Self::Normal
        } else if ratio <= 1.0 {
            Self::Loose
        } else {
            Self::VeryLoose
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Cost parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KnuthPlassParams {
    /// Largest acceptable badness.
    pub tolerance: f64,
    pub line_penalty: f64,
    pub flagged_demerits: f64,
    pub fitness_demerits: f64,
    /// Preferred deviation from the optimal line count.
    pub looseness: i32,
}

impl Default for KnuthPlassParams {
    fn default() -> Self {
        Self::from(&JustificationConfig::default())
    }
}

impl From<&JustificationConfig> for KnuthPlassParams {
    fn from(cfg: &JustificationConfig) -> Self {
        Self {
            tolerance: cfg.tolerance,
            line_penalty: cfg.line_penalty,
            flagged_demerits: cfg.flagged_demerits,
            fitness_demerits: cfg.fitness_demerits,
            looseness: cfg.looseness,
        }
    }
}

/// A chosen break.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Breakpoint {
    /// Index of the glue or penalty item broken at.
    pub position: usize,
    /// 1-based number of the line this break ends.
    pub line: usize,
    pub adjustment_ratio: f64,
    pub fitness: Fitness,
    /// Total demerits up to and including this line.
    pub demerits: f64,
}

#[derive(Clone, Copy, Debug)]
struct Node {
    position: usize,
    line: usize,
    fitness: Fitness,
    flagged: bool,
    total_width: f64,
    total_stretch: f64,
    total_shrink: f64,
    total_demerits: f64,
    ratio: f64,
    prev: Option<usize>,
}

#[derive(Clone, Copy)]
struct Candidate {
    from: usize,
    demerits: f64,
    ratio: f64,
}

/// Badness `100·|r|³`, capped; infinite for overfull lines.
pub fn badness(ratio: f64) -> f64 {
    if ratio < -1.0 {
        f64::INFINITY
    } else {
        (100.0 * ratio.abs().powi(3)).min(MAX_BADNESS)
    }
}

/// Find optimal breakpoints.
///
/// `line_widths[i]` is the target width of line `i + 1`; the last entry
/// repeats for later lines. Returns `None` when no feasible set of breaks
/// exists within tolerance.
pub fn knuth_plass_break(
    items: &[Item],
    line_widths: &[f64],
    params: &KnuthPlassParams,
) -> Option<Vec<Breakpoint>> {
    if items.is_empty() || line_widths.is_empty() {
        return None;
    }
    let mut nodes: Vec<Node> = vec![Node {
        position: 0,
        line: 0,
        fitness: Fitness::Normal,
        flagged: false,
        total_width: 0.0,
        total_stretch: 0.0,
        total_shrink: 0.0,
        total_demerits: 0.0,
        ratio: 0.0,
        prev: None,
    }];
    let mut active: Vec<usize> = vec![0];
    let (mut sum_w, mut sum_y, mut sum_z) = (0.0f64, 0.0f64, 0.0f64);

    for (i, item) in items.iter().enumerate() {
        match *item {
            Item::Box { width } => sum_w += width,
            Item::Glue {
                width,
                stretch,
                shrink,
            } => {
                if i > 0 && matches!(items[i - 1], Item::Box { .. }) {
                    let sums = (sum_w, sum_y, sum_z);
                    try_break(items, i, sums, line_widths, params, &mut nodes, &mut active);
                }
                sum_w += width;
                sum_y += stretch;
                sum_z += shrink;
            }
            Item::Penalty { penalty, .. } => {
                if penalty < INFINITE_PENALTY {
                    let sums = (sum_w, sum_y, sum_z);
                    try_break(items, i, sums, line_widths, params, &mut nodes, &mut active);
                }
            }
        }
        if active.is_empty() {
            return None;
        }
    }

    let last = items.len() - 1;
    let finals: Vec<usize> = active
        .iter()
        .copied()
        .filter(|&idx| nodes[idx].position == last && nodes[idx].line > 0)
        .collect();
    let best = finals.iter().copied().min_by(|&a, &b| {
        nodes[a]
            .total_demerits
            .total_cmp(&nodes[b].total_demerits)
    })?;
    let chosen = if params.looseness == 0 {
        best
    } else {
        let target = nodes[best].line as i64 + i64::from(params.looseness);
        finals
            .iter()
            .copied()
            .min_by(|&a, &b| {
                let da = (nodes[a].line as i64 - target).abs();
                let db = (nodes[b].line as i64 - target).abs();
                da.cmp(&db).then(
                    nodes[a]
                        .total_demerits
                        .total_cmp(&nodes[b].total_demerits),
                )
            })
            .unwrap_or(best)
    };

    let mut out = Vec::with_capacity(nodes[chosen].line);
    let mut cursor = Some(chosen);
    while let Some(idx) = cursor {
        let node = nodes[idx];
        if node.prev.is_none() {
            break;
        }
        out.push(Breakpoint {
            position: node.position,
            line: node.line,
            adjustment_ratio: node.ratio,
            fitness: node.fitness,
            demerits: node.total_demerits,
        });
        cursor = node.prev;
    }
    out.reverse();
    Some(out)
}

fn line_width(line_widths: &[f64], line: usize) -> f64 {
    let idx = line.saturating_sub(1).min(line_widths.len().saturating_sub(1));
    line_widths.get(idx).copied().unwrap_or(0.0)
}

fn adjustment_ratio(target: f64, width: f64, stretch: f64, shrink: f64) -> f64 {
    let shortfall = target - width;
    let ratio = if shortfall.abs() < 1e-9 {
        0.0
    } else if shortfall > 0.0 {
        if stretch > 0.0 {
            shortfall / stretch
        } else {
            MAX_RATIO
        }
    } else if shrink > 0.0 {
        shortfall / shrink
    } else {
        -MAX_RATIO
    };
    ratio.clamp(-MAX_RATIO, MAX_RATIO)
}

#[allow(clippy::too_many_arguments)]
fn try_break(
    items: &[Item],
    position: usize,
    (sum_w, sum_y, sum_z): (f64, f64, f64),
    line_widths: &[f64],
    params: &KnuthPlassParams,
    nodes: &mut Vec<Node>,
    active: &mut Vec<usize>,
) {
    let (pen_width, penalty, flagged) = match items[position] {
        Item::Penalty {
            width,
            penalty,
            flagged,
        } => (width, penalty, flagged),
        _ => (0.0, 0.0, false),
    };
    let forced = penalty <= -INFINITE_PENALTY;
    let mut best: [Option<Candidate>; 4] = [None; 4];

    let mut a = 0;
    while a < active.len() {
        let node_idx = active[a];
        let node = nodes[node_idx];
        let target = line_width(line_widths, node.line + 1);
        let width = sum_w - node.total_width + pen_width;
        let ratio = adjustment_ratio(
            target,
            width,
            sum_y - node.total_stretch,
            sum_z - node.total_shrink,
        );

        if ratio >= -1.0 {
            let bad = badness(ratio);
            if bad <= params.tolerance {
                let base = params.line_penalty + bad;
                let mut demerits = if penalty >= 0.0 {
                    base * base + penalty * penalty
                } else if !forced {
                    base * base - penalty * penalty
                } else {
                    base * base
                };
                if flagged && node.flagged {
                    demerits += params.flagged_demerits;
                }
                let fitness = Fitness::from_ratio(ratio);
                if fitness.index().abs_diff(node.fitness.index()) > 1 {
                    demerits += params.fitness_demerits;
                }
                let total = node.total_demerits + demerits;
                let slot = &mut best[fitness.index()];
                if slot.map_or(true, |c| total < c.demerits) {
                    *slot = Some(Candidate {
                        from: node_idx,
                        demerits: total,
                        ratio,
                    });
                }
            }
        }

        if ratio < -1.0 || forced {
            active.remove(a);
        } else {
            a += 1;
        }
    }

    if best.iter().all(Option::is_none) {
        return;
    }

    // Totals after the break skip the glue and penalties that follow it.
    let (mut tw, mut ty, mut tz) = (sum_w, sum_y, sum_z);
    for (j, item) in items.iter().enumerate().skip(position) {
        match *item {
            Item::Box { .. } => break,
            Item::Glue {
                width,
                stretch,
                shrink,
            } => {
                tw += width;
                ty += stretch;
                tz += shrink;
            }
            Item::Penalty { penalty, .. } => {
                if penalty <= -INFINITE_PENALTY && j > position {
                    break;
                }
            }
        }
    }

    for (class, candidate) in best.iter().enumerate() {
        let Some(candidate) = candidate else {
            continue;
        };
        let fitness = match class {
            0 => Fitness::Tight,
            1 => Fitness::Normal,
            2 => Fitness::Loose,
            _ => Fitness::VeryLoose,
        };
        let from = nodes[candidate.from];
        nodes.push(Node {
            position,
            line: from.line + 1,
            fitness,
            flagged,
            total_width: tw,
            total_stretch: ty,
            total_shrink: tz,
            total_demerits: candidate.demerits,
            ratio: candidate.ratio,
            prev: Some(candidate.from),
        });
        active.push(nodes.len() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(widths: &[f64], space: f64) -> Vec<Item> {
        let mut items = Vec::new();
        for (i, w) in widths.iter().enumerate() {
            if i > 0 {
                items.push(Item::glue(space, space * 0.5, space * 0.33));
            }
            items.push(Item::boxed(*w));
        }
        items.push(Item::fill());
        items.push(Item::forced_break());
        items
    }

    #[test]
    fn two_wide_words_need_two_lines() {
        let items = vec![
            Item::boxed(60.0),
            Item::glue(10.0, 5.0, 3.0),
            Item::boxed(60.0),
            Item::fill(),
            Item::forced_break(),
        ];
        let breaks = knuth_plass_break(&items, &[100.0], &KnuthPlassParams::default())
            .expect("feasible");
        assert_eq!(breaks.len(), 2);
        assert_eq!(breaks[0].position, 1);
        assert_eq!(breaks[1].position, 4);
    }

    #[test]
    fn breakpoints_are_monotonic_with_finite_ratios() {
        let mut seed = 7u32;
        let widths: Vec<f64> = (0..60)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                20.0 + f64::from(seed >> 16 & 0x3f)
            })
            .collect();
        let items = words(&widths, 8.0);
        let breaks =
            knuth_plass_break(&items, &[300.0], &KnuthPlassParams::default()).expect("feasible");
        assert!(breaks.len() > 3);
        for pair in breaks.windows(2) {
            assert!(pair[0].line < pair[1].line);
            assert!(pair[0].position < pair[1].position);
        }
        assert!(breaks.iter().all(|b| b.adjustment_ratio.is_finite()));
        assert_eq!(breaks.last().map(|b| b.position), Some(items.len() - 1));
    }

    #[test]
    fn overfull_box_is_infeasible() {
        let items = words(&[150.0, 20.0], 5.0);
        assert!(knuth_plass_break(&items, &[100.0], &KnuthPlassParams::default()).is_none());
    }

    #[test]
    fn narrow_first_line_is_respected() {
        let items = words(&[30.0; 10], 6.0);
        let breaks = knuth_plass_break(&items, &[70.0, 200.0], &KnuthPlassParams::default())
            .expect("feasible");
        // The first line fits two words at most.
        let first_glue_count = items[..breaks[0].position]
            .iter()
            .filter(|i| matches!(i, Item::Box { .. }))
            .count();
        assert!(first_glue_count <= 2);
        assert!(breaks.len() >= 2);
    }

    #[test]
    fn flagged_and_forced_penalties_change_costs() {
        assert_eq!(Fitness::from_ratio(-0.8), Fitness::Tight);
        assert_eq!(Fitness::from_ratio(0.9), Fitness::Loose);
        assert_eq!(badness(3.0), MAX_BADNESS);
        assert!(badness(-1.5).is_infinite());
        assert!(Item::forced_break().is_forced_break());
        assert!(!Item::penalty(0.0, 50.0, true).is_forced_break());
    }

    #[test]
    fn strict_tolerance_can_reject_every_layout() {
        let items = words(&[45.0, 45.0, 45.0], 4.0);
        let strict = KnuthPlassParams {
            tolerance: 1.0,
            ..KnuthPlassParams::default()
        };
        // A 45px word alone on a 100px line needs ratio 27 > tolerance.
        assert!(knuth_plass_break(&items, &[100.0], &strict).is_none());
    }

    #[test]
    fn looseness_never_shortens_the_paragraph() {
        let items = words(&[20.0; 16], 10.0);
        let base = knuth_plass_break(&items, &[100.0], &KnuthPlassParams::default())
            .expect("feasible");
        let loose = knuth_plass_break(
            &items,
            &[100.0],
            &KnuthPlassParams {
                looseness: 1,
                ..KnuthPlassParams::default()
            },
        )
        .expect("feasible");
        assert!(loose.len() >= base.len());
    }
}
