pub fn mean(data: &[f64]) -> Option<f64> {
    match data.len() {
        0 => None,
        count => Some(data.iter().sum::<f64>() / count as f64),
    }
}

pub fn std_dev(data: &[f64]) -> Option<f64> {
    let data_mean = mean(data)?;
    let variance = data
        .iter()
        .map(|value| {
            let diff = data_mean - *value;
            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64;

    Some(variance.sqrt())
}

/// Trailing simple moving average; each output averages up to `window` inputs ending at
/// the same index.
pub fn moving_average(data: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..data.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            mean(&data[start..=i]).unwrap_or_default()
        })
        .collect()
}

/// Percentage change from `previous` to `current`, `None` when there is no meaningful base.
pub fn percent_change(previous: f64, current: f64) -> Option<f64> {
    if previous > 0.0 && previous.is_finite() && current.is_finite() {
        Some((current - previous) / previous * 100.0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[10., 20., 30., 15., 22.]), Some(19.4));
        assert_eq!(mean(&[-10.0, 0.0, 10.0]), Some(0.0));
    }

    #[test]
    fn test_mean_empty_slice() {
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_std_dev() {
        assert_eq!(
            std_dev(&[100., 120., 90., 102., 94.]),
            Some(10.322790320451151)
        );
        assert_eq!(std_dev(&[5.0, 5.0, 5.0]), Some(0.0));
        assert_eq!(std_dev(&[]), None);
    }

    #[test]
    fn test_moving_average_trailing_window() {
        let avg = moving_average(&[2.0, 4.0, 6.0, 8.0], 2);
        assert_eq!(avg, vec![2.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_moving_average_zero_window_is_identity() {
        assert_eq!(moving_average(&[1.0, 5.0], 0), vec![1.0, 5.0]);
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(20.0, 25.0), Some(25.0));
        assert_eq!(percent_change(20.0, 10.0), Some(-50.0));
        assert_eq!(percent_change(0.0, 10.0), None);
    }
}
