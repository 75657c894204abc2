//! Masked 3x3 smoothing.

/// Number of kernel passes for a smoothing level.
pub fn smoothing_passes(level: u8) -> usize {
    match level {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 4,
    }
}

/// Kernel weights, row-major: corners 1, edges 2, centre 4.
const KERNEL: [[f32; 3]; 3] = [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];

/// Apply `passes` of the masked kernel in place.
///
/// `valid[i]` marks pixels holding data. Invalid pixels neither contribute to
/// their neighbours nor receive a value; each valid pixel becomes the
/// weighted mean of the valid pixels in its neighbourhood.
pub fn smooth(values: &mut [f32], valid: &[bool], width: usize, height: usize, passes: usize) {
    if passes == 0 || width == 0 || height == 0 {
        return;
    }
    let mut scratch = values.to_vec();
    for _ in 0..passes {
        for row in 0..height {
            for col in 0..width {
                let idx = row * width + col;
                if !valid[idx] {
                    scratch[idx] = values[idx];
                    continue;
                }
                let mut sum = 0.0f32;
                let mut weight = 0.0f32;
                for (dy, kernel_row) in KERNEL.iter().enumerate() {
                    let Some(r) = (row + dy).checked_sub(1) else {
                        continue;
                    };
                    if r >= height {
                        continue;
                    }
                    for (dx, &w) in kernel_row.iter().enumerate() {
                        let Some(c) = (col + dx).checked_sub(1) else {
                            continue;
                        };
                        if c >= width {
                            continue;
                        }
                        let n = r * width + c;
                        if valid[n] {
                            sum += values[n] * w;
                            weight += w;
                        }
                    }
                }
                scratch[idx] = sum / weight;
            }
        }
        values.copy_from_slice(&scratch);
    }
}
