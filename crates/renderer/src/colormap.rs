//! Colour map stop tables.

use ecv_common::ColourMapName;

const YL_OR_RD: &[&str] = &[
    "#ffffcc", "#ffeda0", "#fed976", "#feb24c", "#fd8d3c", "#fc4e2a", "#e31a1c", "#bd0026",
    "#800026",
];

const RD_YL_BU_R: &[&str] = &[
    "#313695", "#4575b4", "#74add1", "#abd9e9", "#e0f3f8", "#ffffbf", "#fee090", "#fdae61",
    "#f46d43", "#d73027", "#a50026",
];

const YL_GN_BU: &[&str] = &[
    "#ffffd9", "#edf8b1", "#c7e9b4", "#7fcdbb", "#41b6c4", "#1d91c0", "#225ea8", "#253494",
    "#081d58",
];

const VIRIDIS: &[&str] = &[
    "#440154", "#482475", "#414487", "#355f8d", "#2a788e", "#21918c", "#22a884", "#44bf70",
    "#7ad151", "#bddf26", "#fde725",
];

const CIVIDIS: &[&str] = &[
    "#00224e", "#083370", "#35456c", "#4f576c", "#666970", "#7d7c78", "#948f78", "#aea371",
    "#c8b866", "#e5cf52", "#fee838",
];

const PLASMA: &[&str] = &[
    "#0d0887", "#41049d", "#6a00a8", "#8f0da4", "#b12a90", "#cc4778", "#e16462", "#f2844b",
    "#fca636", "#fcce25", "#f0f921",
];

const INFERNO: &[&str] = &[
    "#000004", "#160b39", "#420a68", "#6a176e", "#932667", "#bc3754", "#dd513a", "#f37819",
    "#fca50a", "#f6d746", "#fcffa4",
];

/// Parse hex color string to RGB
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

    Some((r, g, b))
}

/// Ordered RGB stops of a named colour map, low values first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColourMap {
    pub name: ColourMapName,
    pub stops: Vec<[u8; 3]>,
}

impl ColourMap {
    pub fn new(name: ColourMapName) -> Self {
        let stops = hex_stops(name)
            .iter()
            .filter_map(|hex| hex_to_rgb(hex))
            .map(|(r, g, b)| [r, g, b])
            .collect();
        Self { name, stops }
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Stop for a normalised value: `bin = floor(t * (N - 1))`.
    #[inline]
    pub fn bin(&self, t: f32) -> [u8; 3] {
        let n = self.stops.len();
        if n == 0 {
            return [0, 0, 0];
        }
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let idx = ((t * (n - 1) as f32).floor() as usize).min(n - 1);
        self.stops[idx]
    }
}

/// Hex stop table of a colour map.
pub fn hex_stops(name: ColourMapName) -> &'static [&'static str] {
    match name {
        ColourMapName::YlOrRd => YL_OR_RD,
        ColourMapName::RdYlBuR => RD_YL_BU_R,
        ColourMapName::YlGnBu => YL_GN_BU,
        ColourMapName::Viridis => VIRIDIS,
        ColourMapName::Cividis => CIVIDIS,
        ColourMapName::Plasma => PLASMA,
        ColourMapName::Inferno => INFERNO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_rgb() {
        assert_eq!(hex_to_rgb("#FF0000"), Some((255, 0, 0)));
        assert_eq!(hex_to_rgb("00ff00"), Some((0, 255, 0)));
        assert_eq!(hex_to_rgb("#GGGGGG"), None);
        assert_eq!(hex_to_rgb("#fff"), None);
    }

    #[test]
    fn test_every_table_parses() {
        for name in ColourMapName::ALL {
            let map = ColourMap::new(name);
            assert_eq!(map.len(), hex_stops(name).len(), "{}", name);
            assert!(map.len() >= 9);
        }
    }

    #[test]
    fn test_binning() {
        let map = ColourMap::new(ColourMapName::YlOrRd);
        assert_eq!(map.bin(0.0), [0xff, 0xff, 0xcc]);
        assert_eq!(map.bin(1.0), [0x80, 0x00, 0x26]);
        // 0.5 * 8 = 4 exactly.
        assert_eq!(map.bin(0.5), [0xfd, 0x8d, 0x3c]);
        // Just under a bin edge stays in the lower bin.
        assert_eq!(map.bin(0.124), [0xff, 0xff, 0xcc]);
        assert_eq!(map.bin(2.0), map.bin(1.0));
    }
}
