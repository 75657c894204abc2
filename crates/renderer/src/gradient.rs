//! Value-to-colour mapping of a numeric slice.

use rayon::prelude::*;
use tracing::debug;

use ecv_common::{ColourMapName, EngineError, EngineResult, FillPolicy};

use crate::colormap::ColourMap;
use crate::handle::ImageHandle;
use crate::smooth::{smooth, smoothing_passes};

/// Alpha of every pixel that holds data.
pub const IN_RANGE_ALPHA: u8 = 200;

/// Below this many pixels the mapping pass runs on the calling thread.
const PARALLEL_MIN_PIXELS: usize = 64 * 1024;

/// Everything besides the buffer that determines the output image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    pub colour_map: ColourMapName,
    pub vmin: f32,
    pub vmax: f32,
    pub fill_policy: FillPolicy,
    /// Smoothing level 0..=3.
    pub smoothing: u8,
}

/// Render a row-major `width x height` slice (row 0 drawn at the top).
///
/// No-data pixels become `[0, 0, 0, 0]`; all others take the RGB of their
/// colour-map bin with alpha [`IN_RANGE_ALPHA`].
pub fn render(
    values: &[f32],
    width: usize,
    height: usize,
    params: &RenderParams,
) -> EngineResult<ImageHandle> {
    if values.len() != width * height {
        return Err(EngineError::shape_mismatch(format!(
            "{} values for a {}x{} slice",
            values.len(),
            width,
            height
        )));
    }
    let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
        return Err(EngineError::shape_mismatch(format!(
            "slice {}x{} too large",
            width, height
        )));
    };

    let policy = params.fill_policy;
    let valid: Vec<bool> = values.iter().map(|&v| !policy.is_no_data(v)).collect();

    let passes = smoothing_passes(params.smoothing);
    let smoothed;
    let data: &[f32] = if passes > 0 {
        let mut buf = values.to_vec();
        smooth(&mut buf, &valid, width, height, passes);
        smoothed = buf;
        &smoothed
    } else {
        values
    };

    let map = ColourMap::new(params.colour_map);
    let range = params.vmax - params.vmin;
    let vmin = params.vmin;

    let mut pixels = vec![0u8; width * height * 4];
    let paint = |(i, px): (usize, &mut [u8])| {
        if valid[i] {
            let t = (data[i] - vmin) / range;
            let [r, g, b] = map.bin(t);
            px.copy_from_slice(&[r, g, b, IN_RANGE_ALPHA]);
        }
    };
    if pixels.len() / 4 >= PARALLEL_MIN_PIXELS {
        pixels.par_chunks_mut(4).enumerate().for_each(paint);
    } else {
        pixels.chunks_mut(4).enumerate().for_each(paint);
    }

    debug!(
        width,
        height,
        colour_map = %params.colour_map,
        smoothing = params.smoothing,
        "Rendered slice"
    );
    ImageHandle::from_rgba(w, h, pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(smoothing: u8) -> RenderParams {
        RenderParams {
            colour_map: ColourMapName::YlOrRd,
            vmin: 0.0,
            vmax: 1.0,
            fill_policy: FillPolicy::default(),
            smoothing,
        }
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(render(&[1.0; 3], 2, 2, &params(0)).is_err());
    }

    #[test]
    fn test_no_data_is_fully_transparent() {
        let image = render(&[f32::NAN, 0.0, -3.0, 0.5], 2, 2, &params(0)).unwrap();
        assert_eq!(image.pixel(0, 0), [0, 0, 0, 0]);
        assert_eq!(image.pixel(1, 0), [0, 0, 0, 0]);
        assert_eq!(image.pixel(0, 1), [0, 0, 0, 0]);
        assert_eq!(image.pixel(1, 1)[3], IN_RANGE_ALPHA);
    }

    #[test]
    fn test_values_outside_range_clamp() {
        let image = render(&[0.01, 50.0], 2, 1, &params(0)).unwrap();
        assert_eq!(image.pixel(0, 0), [0xff, 0xff, 0xcc, IN_RANGE_ALPHA]);
        assert_eq!(image.pixel(1, 0), [0x80, 0x00, 0x26, IN_RANGE_ALPHA]);
    }
}
