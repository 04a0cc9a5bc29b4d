//! Row-padding arithmetic for texture → buffer copies.

/// Bytes per pixel of the frame target (`Bgra8Unorm`).
pub const BYTES_PER_PIXEL: u32 = 4;

/// Row pitch of a staging buffer: `width * 4` rounded up to wgpu's copy
/// alignment (256 bytes).
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Copies `height` rows out of a padded staging image into a tightly packed
/// destination. Returns `false` when either side is too short.
pub fn unpad_rows(src: &[u8], padded_bpr: usize, dst: &mut [u8], row_bytes: usize, height: usize) -> bool {
    if row_bytes > padded_bpr
        || src.len() < padded_bpr * height.saturating_sub(1) + row_bytes
        || dst.len() < row_bytes * height
    {
        return false;
    }
    for (row, out) in dst.chunks_exact_mut(row_bytes).take(height).enumerate() {
        let start = row * padded_bpr;
        out.copy_from_slice(&src[start..start + row_bytes]);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(960), 3840);
        assert_eq!(padded_bytes_per_row(1), 256);
    }

    #[test]
    fn unpad_strips_row_tails() {
        // Two rows of 2 bytes, pitch 4.
        let src = [1, 2, 9, 9, 3, 4, 9, 9];
        let mut dst = [0u8; 4];
        assert!(unpad_rows(&src, 4, &mut dst, 2, 2));
        assert_eq!(dst, [1, 2, 3, 4]);
    }

    #[test]
    fn unpad_accepts_unpadded_final_row() {
        let src = [1, 2, 9, 9, 3, 4];
        let mut dst = [0u8; 4];
        assert!(unpad_rows(&src, 4, &mut dst, 2, 2));
        assert_eq!(dst, [1, 2, 3, 4]);
    }

    #[test]
    fn unpad_rejects_short_buffers() {
        let mut dst = [0u8; 4];
        assert!(!unpad_rows(&[1, 2, 9], 4, &mut dst, 2, 2));
        assert!(!unpad_rows(&[0; 8], 4, &mut [0u8; 3], 2, 2));
    }
}
