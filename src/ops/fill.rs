//! Scanline flood fill over flat RGBA8 buffers.

/// Colour of pixel `(x, y)` in a flat RGBA8 buffer of row width `width`.
/// `None` outside the buffer.
pub fn pixel_color(data: &[u8], width: u32, x: u32, y: u32) -> Option<[u8; 4]> {
    if x >= width {
        return None;
    }
    let o = (y as usize * width as usize + x as usize) * 4;
    let px = data.get(o..o + 4)?;
    Some([px[0], px[1], px[2], px[3]])
}

/// Recolour the 4-connected run of `target` pixels containing `(x, y)`.
///
/// Colours match on exact per-channel equality. Each pop expands a whole
/// horizontal run, recolours it, and pushes the neighbours above and below
/// that still match. Returns the number of pixels recoloured; out-of-bounds
/// seeds, `target == fill` and a buffer of the wrong length all return 0.
pub fn flood_fill_scanline(
    data: &mut [u8],
    width: u32,
    height: u32,
    x: u32,
    y: u32,
    target: [u8; 4],
    fill: [u8; 4],
) -> usize {
    let wu = width as usize;
    let hu = height as usize;
    if x >= width || y >= height || target == fill || data.len() != wu * hu * 4 {
        return 0;
    }

    #[inline(always)]
    fn matches(data: &[u8], idx: usize, tc: [u8; 4]) -> bool {
        let o = idx * 4;
        data[o] == tc[0] && data[o + 1] == tc[1] && data[o + 2] == tc[2] && data[o + 3] == tc[3]
    }

    #[inline(always)]
    fn set(data: &mut [u8], idx: usize, fc: [u8; 4]) {
        let o = idx * 4;
        data[o..o + 4].copy_from_slice(&fc);
    }

    let mut filled = 0;
    // Packed flat indices (y * width + x)
    let mut stack: Vec<usize> = Vec::with_capacity(1024);
    stack.push(y as usize * wu + x as usize);

    while let Some(idx) = stack.pop() {
        if !matches(data, idx, target) {
            continue;
        }
        let row = idx / wu;
        let row_start = row * wu;

        let mut left = idx;
        while left > row_start && matches(data, left - 1, target) {
            left -= 1;
        }
        let mut right = idx;
        while right + 1 < row_start + wu && matches(data, right + 1, target) {
            right += 1;
        }

        for i in left..=right {
            set(data, i, fill);
            filled += 1;
            if row > 0 && matches(data, i - wu, target) {
                stack.push(i - wu);
            }
            if row + 1 < hu && matches(data, i + wu, target) {
                stack.push(i + wu);
            }
        }
    }

    filled
}
