//! Changepoint extraction from run-length histories

use rv::misc::argmax;

/// Indices of the run-length distributions whose mass on run lengths
/// `1..=window` reaches `threshold`.
#[must_use]
pub fn window_over_threshold(r: &[Vec<f64>], window: usize, threshold: f64) -> Vec<usize> {
    r.iter()
        .enumerate()
        .filter(|(_, rs)| rs.iter().skip(1).take(window).sum::<f64>() >= threshold)
        .map(|(i, _)| i)
        .collect()
}

//    0 1 2 3 4 5 6 7
// 0 [1]                  | s = 0 DONE
// 1 [0 1]                |
// 2 [0 0 1]              |
// 3 [0 0 0 1]            | s = 3, argmax = 3, s -> s - 3 = 0, CPs: [7, 4, 0]
// 4 [1] - Change         | s = 4, argmax = 0, s -> s - 1 = 3, CPs: [7, 4]
// 5 [0 1]                |
// 6 [0 0 1]              | s = 6, argmax = 2, s -> s - 2 = 4, CPs: [7, 4]
// 7 [1] - Change         | s = 7, argmax = 0, s -> s - 1 = 6, CPs: [7]
// 8 [0 1]                | s = 8, argmax = 1, s -> s - 1 = 7, CPs: [7]

/// Maximum a posteriori change points
///
/// This reverse walks through the run-length distribution sequence and only
/// takes the most likely set of change-points. Entry `i` of `r` is the
/// distribution after observing sample `i`; an empty history has no
/// change points.
#[must_use]
pub fn map_changepoints(r: &[Vec<f64>]) -> Vec<usize> {
    let Some(mut s) = r.len().checked_sub(1) else {
        return Vec::new();
    };
    let mut change_points: Vec<usize> = vec![];
    while s != 0 {
        let most_likely_runlength = argmax(&r[s]).first().copied().unwrap_or(0);

        if most_likely_runlength == 0 {
            if let Some(last) = change_points.last() {
                if *last != s {
                    change_points.push(s);
                }
            }
            s = s.saturating_sub(1);
        } else {
            s = s.saturating_sub(most_likely_runlength);
            change_points.push(s);
        }
    }
    change_points.reverse();
    change_points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmented() -> [Vec<f64>; 9] {
        [
            vec![1.],
            vec![0., 1.],
            vec![0., 0., 1.],
            vec![0., 0., 0., 1.],
            vec![1.],
            vec![0., 1.],
            vec![0., 0., 1.],
            vec![1.],
            vec![0., 1.],
        ]
    }

    #[test]
    fn simple_map() {
        assert_eq!(map_changepoints(&segmented()), vec![0, 4, 7]);
    }

    #[test]
    fn consecutive_map() {
        let r: [Vec<f64>; 9] = [
            vec![1.],
            vec![0., 1.],
            vec![0., 0., 1.],
            vec![0., 0., 0., 1.],
            vec![1.],
            vec![1.],
            vec![1.],
            vec![1.],
            vec![0., 1.],
        ];

        assert_eq!(map_changepoints(&r), vec![0, 4, 5, 6, 7]);
    }

    #[test]
    fn empty_history() {
        assert!(map_changepoints(&[]).is_empty());
        assert!(map_changepoints(&[vec![1.0]]).is_empty());
    }

    #[test]
    fn window_threshold() {
        assert_eq!(window_over_threshold(&segmented(), 1, 0.5), vec![1, 5, 8]);
        assert_eq!(
            window_over_threshold(&segmented(), 3, 0.5),
            vec![1, 2, 3, 5, 6, 8]
        );
        assert!(window_over_threshold(&segmented(), 0, 0.5).is_empty());
    }
}
