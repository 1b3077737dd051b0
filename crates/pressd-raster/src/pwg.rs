// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PWG Raster / Apple Raster stream reader (PWG 5102.4). Both formats
// share a synchronization word followed by a sequence of pages, each
// with a fixed-size header and row-major pixel data; the two differ
// only in the sync word and a handful of reserved header fields, which
// this reader does not need to interpret.

use pressd_core::CoreError;
use tracing::instrument;

use crate::driver::{Driver, Orientation, PrintOptions};

const PWG_SYNC: &[u8; 4] = b"RaS2";
const APPLE_SYNC: &[u8; 4] = b"RaS1";
const HEADER_LEN: usize = 1796;

/// Fields this reader extracts from the 1796-byte page header; the
/// remainder is reserved/vendor space and is skipped.
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub bytes_per_line: u32,
}

impl PageHeader {
    fn parse(buf: &[u8; HEADER_LEN]) -> Result<Self, CoreError> {
        // Offsets per PWG 5102.4: BitsPerPixel @ 56, BytesPerLine @ 60,
        // Width @ 372, Height @ 376 (all big-endian u32).
        let read_u32 = |offset: usize| -> u32 {
            u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
        };
        let bits_per_pixel = read_u32(56);
        let bytes_per_line = read_u32(60);
        let width = read_u32(372);
        let height = read_u32(376);
        if width == 0 || height == 0 {
            return Err(CoreError::DocumentUnprintable("raster page header has zero dimension".into()));
        }
        Ok(Self {
            width,
            height,
            bits_per_pixel,
            bytes_per_line,
        })
    }
}

/// Stream a PWG/Apple raster document through the driver callbacks: one
/// `rstartpage`/`rwrite*`/`rendpage` cycle per page, bracketed by a single
/// `rstartjob`/`rendjob`. Any read error aborts the job.
#[instrument(skip(data, driver))]
pub fn process_raster(data: &[u8], options: &PrintOptions, driver: &mut dyn Driver) -> Result<(), CoreError> {
    if data.len() < 4 {
        return Err(CoreError::DocumentUnprintable("raster stream too short for sync word".into()));
    }
    let sync: &[u8; 4] = data[0..4].try_into().unwrap();
    if sync != PWG_SYNC && sync != APPLE_SYNC {
        return Err(CoreError::DocumentFormat("unrecognized raster sync word".into()));
    }

    let mut offset = 4;
    if !driver.rstartjob(options) {
        return Err(CoreError::DocumentUnprintable("driver rejected rstartjob".into()));
    }

    let mut page_no = 0;
    while offset < data.len() {
        if offset + HEADER_LEN > data.len() {
            return Err(CoreError::DocumentUnprintable("truncated raster page header".into()));
        }
        let header_bytes: &[u8; HEADER_LEN] = data[offset..offset + HEADER_LEN].try_into().unwrap();
        let header = PageHeader::parse(header_bytes)?;
        offset += HEADER_LEN;

        if !driver.rstartpage(options, page_no) {
            return Err(CoreError::DocumentUnprintable("driver rejected rstartpage".into()));
        }

        let row_len = header.bytes_per_line.max(1) as usize;
        for y in 0..header.height {
            if offset + row_len > data.len() {
                return Err(CoreError::DocumentUnprintable("truncated raster row data".into()));
            }
            let row = &data[offset..offset + row_len];
            if !driver.rwrite(options, y, row) {
                return Err(CoreError::DocumentUnprintable("driver rejected rwrite".into()));
            }
            offset += row_len;
        }

        if !driver.rendpage(options, page_no) {
            return Err(CoreError::DocumentUnprintable("driver rejected rendpage".into()));
        }
        page_no += 1;
    }

    if !driver.rendjob(options) {
        return Err(CoreError::DocumentUnprintable("driver rejected rendjob".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingDriver {
        pages: usize,
        rows: usize,
    }

    impl Driver for Arc<Mutex<RecordingDriver>> {
        fn rstartjob(&mut self, _: &PrintOptions) -> bool {
            true
        }
        fn rendjob(&mut self, _: &PrintOptions) -> bool {
            true
        }
        fn rstartpage(&mut self, _: &PrintOptions, _: u32) -> bool {
            self.lock().unwrap().pages += 1;
            true
        }
        fn rendpage(&mut self, _: &PrintOptions, _: u32) -> bool {
            true
        }
        fn rwrite(&mut self, _: &PrintOptions, _: u32, _: &[u8]) -> bool {
            self.lock().unwrap().rows += 1;
            true
        }
        fn print(&mut self, _: &PrintOptions, _: &[u8]) -> bool {
            true
        }
    }

    fn test_options() -> PrintOptions {
        PrintOptions {
            media_width_hundredths_mm: 21590,
            media_height_hundredths_mm: 27940,
            margin_hundredths_mm: 0,
            resolution_dpi: 300,
            orientation: Orientation::Portrait,
            copies: 1,
        }
    }

    fn single_page_stream(width: u32, height: u32, bytes_per_line: u32) -> Vec<u8> {
        let mut data = PWG_SYNC.to_vec();
        let mut header = vec![0u8; HEADER_LEN];
        header[56..60].copy_from_slice(&1u32.to_be_bytes());
        header[60..64].copy_from_slice(&bytes_per_line.to_be_bytes());
        header[372..376].copy_from_slice(&width.to_be_bytes());
        header[376..380].copy_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&header);
        data.extend(std::iter::repeat(0u8).take((bytes_per_line * height) as usize));
        data
    }

    #[test]
    fn rejects_bad_sync_word() {
        let data = b"XXXXrest-of-stream".to_vec();
        let driver = Arc::new(Mutex::new(RecordingDriver::default()));
        let mut driver = driver;
        let err = process_raster(&data, &test_options(), &mut driver).unwrap_err();
        assert!(matches!(err, CoreError::DocumentFormat(_)));
    }

    #[test]
    fn streams_one_page_with_expected_row_count() {
        let data = single_page_stream(8, 4, 1);
        let driver = Arc::new(Mutex::new(RecordingDriver::default()));
        let mut driver = driver;
        process_raster(&data, &test_options(), &mut driver).unwrap();
        let state = driver.lock().unwrap();
        assert_eq!(state.pages, 1);
        assert_eq!(state.rows, 4);
    }

    #[test]
    fn truncated_row_data_aborts() {
        let mut data = single_page_stream(8, 4, 1);
        data.truncate(data.len() - 2);
        let driver = Arc::new(Mutex::new(RecordingDriver::default()));
        let mut driver = driver;
        assert!(process_raster(&data, &test_options(), &mut driver).is_err());
    }
}
