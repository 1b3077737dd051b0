// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The driver callback contract. A driver turns rasterized pages into
// bytes on the wire to the device; every callback returning `false`
// aborts the job in progress.

/// Orientation applied before scaling into the imageable box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
    ReverseLandscape,
    ReversePortrait,
}

impl Orientation {
    /// Rotation in degrees, matching the job-attribute mapping of
    /// `orientation-requested` (3=portrait, 4=landscape, 5=reverse-landscape,
    /// 6=reverse-portrait).
    pub fn from_ipp(value: i32) -> Self {
        match value {
            4 => Orientation::Landscape,
            5 => Orientation::ReverseLandscape,
            6 => Orientation::ReversePortrait,
            _ => Orientation::Portrait,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Orientation::Portrait => 0,
            Orientation::Landscape => 90,
            Orientation::ReverseLandscape => 270,
            Orientation::ReversePortrait => 180,
        }
    }
}

/// Media size and margins in 1/100 mm, plus the device resolution needed
/// to convert them to pixels.
#[derive(Debug, Clone, Copy)]
pub struct PrintOptions {
    pub media_width_hundredths_mm: u32,
    pub media_height_hundredths_mm: u32,
    pub margin_hundredths_mm: u32,
    pub resolution_dpi: u32,
    pub orientation: Orientation,
    pub copies: u32,
}

impl PrintOptions {
    /// `(left, top, width, height)` of the imageable box in device pixels.
    pub fn imageable_box(&self) -> (u32, u32, u32, u32) {
        let px_per_hundredth_mm = self.resolution_dpi as f64 / 2540.0;
        let margin_px = (self.margin_hundredths_mm as f64 * px_per_hundredth_mm).round() as u32;
        let width_px = (self.media_width_hundredths_mm as f64 * px_per_hundredth_mm).round() as u32;
        let height_px = (self.media_height_hundredths_mm as f64 * px_per_hundredth_mm).round() as u32;
        (
            margin_px,
            margin_px,
            width_px.saturating_sub(2 * margin_px),
            height_px.saturating_sub(2 * margin_px),
        )
    }
}

/// Callback vtable a printer driver implements to consume rasterized
/// output. All methods return `false` to abort the job.
pub trait Driver: Send {
    fn rstartjob(&mut self, options: &PrintOptions) -> bool;
    fn rendjob(&mut self, options: &PrintOptions) -> bool;
    fn rstartpage(&mut self, options: &PrintOptions, page_no: u32) -> bool;
    fn rendpage(&mut self, options: &PrintOptions, page_no: u32) -> bool;
    /// `row` is 0-based from the top; `row_bytes` is one packed row of
    /// output (1-bit-per-pixel for the dithered PNG path, driver-native
    /// packing for the PWG raster path).
    fn rwrite(&mut self, options: &PrintOptions, row: u32, row_bytes: &[u8]) -> bool;
    /// Raw path: hand the spooled file to the driver in one call when its
    /// format matches `driver.native_format` exactly.
    fn print(&mut self, options: &PrintOptions, raw: &[u8]) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imageable_box_subtracts_margins() {
        let opts = PrintOptions {
            media_width_hundredths_mm: 21590,  // Letter width, 8.5in
            media_height_hundredths_mm: 27940, // Letter height, 11in
            margin_hundredths_mm: 635,         // 0.25in
            resolution_dpi: 300,
            orientation: Orientation::Portrait,
            copies: 1,
        };
        let (left, top, width, height) = opts.imageable_box();
        assert_eq!(left, top);
        assert!(width < (opts.media_width_hundredths_mm as f64 / 2540.0 * 300.0) as u32);
        assert!(height > 0);
    }

    #[test]
    fn orientation_round_trips_ipp_values() {
        assert_eq!(Orientation::from_ipp(3), Orientation::Portrait);
        assert_eq!(Orientation::from_ipp(4), Orientation::Landscape);
        assert_eq!(Orientation::from_ipp(5), Orientation::ReverseLandscape);
        assert_eq!(Orientation::from_ipp(6), Orientation::ReversePortrait);
        assert_eq!(Orientation::Landscape.degrees(), 90);
    }
}
