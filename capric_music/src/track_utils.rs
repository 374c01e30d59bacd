// Primitives shared by every track generator: weighted choice, octave
// folding into an instrument range, and the post-pass overlap trim.
//
// Two weighted-choice forms exist. `weighted_choice` takes integer weights and
// draws uniformly from the implied expanded pool (an item of weight 3 counts
// three times); `cumulative_choice` walks fractional probabilities and is used
// for the style tables whose weights do not sum to anything in particular.
// Both never return a zero-weight item.

use capric_prng::RandomSource;

use crate::timeline::NoteEvent;

/// Octave shifts attempted before clamping.
const MAX_FOLD_STEPS: usize = 10;
/// Fewest passes any fill loop may take, however short the span.
const MIN_FILL_ITERATIONS: usize = 30;

/// Uniform draw over the pool where each item appears `weight` times.
pub fn weighted_choice<'a, T, R: RandomSource>(
    items: &'a [(T, u32)],
    rng: &mut R,
) -> Option<&'a T> {
    let total: u64 = items.iter().map(|(_, w)| *w as u64).sum();
    if total == 0 {
        return None;
    }
    let mut roll = rng.range_u64(0, total);
    for (item, weight) in items {
        let w = *weight as u64;
        if roll < w {
            return Some(item);
        }
        roll -= w;
    }
    None
}

/// Cumulative walk over fractional weights. Items with weight <= 0 are
/// skipped; the walk is normalized by the positive total.
pub fn cumulative_choice<'a, T, R: RandomSource>(
    items: &'a [(T, f64)],
    rng: &mut R,
) -> Option<&'a T> {
    let total: f64 = items.iter().map(|(_, w)| w.max(0.0)).sum();
    if total <= 0.0 {
        return None;
    }
    let roll = rng.next_f64() * total;
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (item, weight) in items {
        if *weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        last_positive = Some(item);
        if roll < cumulative {
            return Some(item);
        }
    }
    last_positive
}

/// Uniform pick from a slice.
pub fn pick<'a, T, R: RandomSource>(items: &'a [T], rng: &mut R) -> Option<&'a T> {
    if items.is_empty() {
        None
    } else {
        items.get(rng.range_usize(0, items.len()))
    }
}

/// Transpose by octaves until `pitch` lies in `[min, max]`, clamping if the
/// range is narrower than an octave or the shift budget runs out.
pub fn fold_into_range(pitch: i32, min: u8, max: u8) -> u8 {
    let (lo, hi) = (min as i32, max as i32);
    let mut p = pitch;
    for _ in 0..MAX_FOLD_STEPS {
        if p < lo {
            p += 12;
        } else if p > hi {
            p -= 12;
        } else {
            break;
        }
    }
    p.clamp(lo, hi) as u8
}

/// Fold into range, then move one octave toward `reference` when the pitch
/// sits more than `threshold` semitones away and the shifted note still fits.
pub fn fold_toward_reference(pitch: i32, min: u8, max: u8, reference: f64, threshold: f64) -> u8 {
    let folded = fold_into_range(pitch, min, max) as i32;
    let distance = folded as f64 - reference;
    if distance.abs() <= threshold {
        return folded as u8;
    }
    let shifted = if distance > 0.0 { folded - 12 } else { folded + 12 };
    if (min as i32..=max as i32).contains(&shifted) {
        shifted as u8
    } else {
        folded as u8
    }
}

/// Sort by start tick, then shorten any event that runs into its successor.
/// An event whose shortened length falls below `min_duration` is dropped.
/// Events with zero length are always dropped.
pub fn trim_overlaps(events: &mut Vec<NoteEvent>, min_duration: u32) {
    events.sort_by_key(|e| e.start_tick);
    let mut out: Vec<NoteEvent> = Vec::with_capacity(events.len());
    for (i, event) in events.iter().enumerate() {
        let mut e = event.clone();
        if let Some(next) = events[i + 1..].iter().find(|n| n.start_tick > e.start_tick)
            && e.end_tick() > next.start_tick
        {
            e.duration_ticks = next.start_tick - e.start_tick;
            if e.duration_ticks < min_duration {
                continue;
            }
        }
        // Two events on the same tick: the later one wins.
        if events.get(i + 1).is_some_and(|n| n.start_tick == e.start_tick) {
            continue;
        }
        if e.duration_ticks == 0 {
            continue;
        }
        out.push(e);
    }
    *events = out;
}

/// True when sorted events never overlap.
pub fn is_non_overlapping(events: &[NoteEvent]) -> bool {
    events.windows(2).all(|w| w[0].end_tick() <= w[1].start_tick)
}

/// Pass limit for a loop filling `duration` ticks in steps of roughly `min_step`.
pub fn fill_iteration_cap(duration: u32, min_step: u32) -> usize {
    MIN_FILL_ITERATIONS.max(duration.div_ceil(min_step.max(1)) as usize * 3)
}

pub fn clamp_velocity(v: i32, min: u8, max: u8) -> u8 {
    v.clamp(min as i32, max as i32) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use capric_prng::GameRng;

    #[test]
    fn test_weighted_choice_never_picks_zero_weight() {
        let mut rng = GameRng::new(1);
        let items = [("a", 5), ("zero", 0), ("c", 5)];
        let mut seen_a = false;
        let mut seen_c = false;
        for _ in 0..2000 {
            match *weighted_choice(&items, &mut rng).unwrap() {
                "a" => seen_a = true,
                "c" => seen_c = true,
                other => panic!("picked {other}"),
            }
        }
        assert!(seen_a && seen_c);
        let all_zero = [(1, 0), (2, 0)];
        assert!(weighted_choice(&all_zero, &mut rng).is_none());
    }

    #[test]
    fn test_cumulative_choice_skips_non_positive() {
        let mut rng = GameRng::new(2);
        let items = [(0u8, 0.0), (1, 0.2), (2, -1.0), (3, 0.8)];
        for _ in 0..2000 {
            let v = *cumulative_choice(&items, &mut rng).unwrap();
            assert!(v == 1 || v == 3);
        }
    }

    #[test]
    fn test_fold_into_range() {
        assert_eq!(fold_into_range(24, 36, 57), 36);
        assert_eq!(fold_into_range(70, 36, 57), 46);
        assert_eq!(fold_into_range(40, 36, 57), 40);
        // Narrow range clamps.
        assert_eq!(fold_into_range(61, 62, 64), 62);
        assert_eq!(fold_into_range(-300, 36, 57), 36);
    }

    #[test]
    fn test_fold_toward_reference() {
        // 55 is 9 above 46: shift down to 43.
        assert_eq!(fold_toward_reference(55, 36, 57, 46.0, 8.0), 43);
        // 38 is 12 below 50: shift up to 50.
        assert_eq!(fold_toward_reference(38, 36, 57, 50.0, 8.0), 50);
        // Shift would leave the range: keep the folded pitch.
        assert_eq!(fold_toward_reference(47, 36, 57, 60.0, 8.0), 47);
    }

    #[test]
    fn test_fill_iteration_cap() {
        assert_eq!(fill_iteration_cap(0, 16), 30);
        assert_eq!(fill_iteration_cap(512, 8), 192);
        assert_eq!(fill_iteration_cap(1000, 16), 189);
        // A zero step counts as one tick.
        assert_eq!(fill_iteration_cap(40, 0), 120);
    }

    #[test]
    fn test_trim_overlaps_shrinks_and_drops() {
        let mut events = vec![
            NoteEvent::new(40, 100, 50, 80),
            NoteEvent::new(41, 0, 200, 80),
            NoteEvent::new(42, 120, 10, 80),
        ];
        trim_overlaps(&mut events, 16);
        // 0..200 trimmed to 0..100; 100..150 would shrink to 20 (kept);
        // 120..130 untouched.
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].duration_ticks, 100);
        assert_eq!(events[1].duration_ticks, 20);
        assert!(is_non_overlapping(&events));

        let mut tight = vec![NoteEvent::new(40, 0, 100, 80), NoteEvent::new(41, 4, 100, 80)];
        trim_overlaps(&mut tight, 16);
        assert_eq!(tight.len(), 1);
        assert_eq!(tight[0].start_tick, 4);
    }
}
