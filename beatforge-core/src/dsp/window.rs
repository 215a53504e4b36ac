/// Periodic Hann window of the given size, matching the window used by the
/// teacher's onset/tempo/spectral modules (`0.5 * (1 - cos(2*pi*n/(N-1)))`).
pub fn hann_window(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|n| {
            0.5 * (1.0
                - (2.0 * std::f32::consts::PI * n as f32 / (size as f32 - 1.0)).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_window_is_symmetric_and_bounded() {
        let w = hann_window(8);
        assert_eq!(w.len(), 8);
        assert!((w[0] - w[7]).abs() < 1e-6);
        assert!(w.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn hann_window_edges_are_zero() {
        let w = hann_window(16);
        assert!(w[0] < 1e-6);
    }
}
