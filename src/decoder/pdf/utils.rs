use mupdf::{Matrix, Pixmap, Rect};

/// 把页面边界拉伸到目标像素尺寸的变换矩阵（宽高方向各自缩放）
pub fn create_fit_matrix(bounds: &Rect, width: u32, height: u32) -> Matrix {
    let page_width = (bounds.x1 - bounds.x0).max(f32::EPSILON);
    let page_height = (bounds.y1 - bounds.y0).max(f32::EPSILON);
    let sx = width as f32 / page_width;
    let sy = height as f32 / page_height;

    let mut matrix = Matrix::new(sx, 0.0, 0.0, sy, 0.0, 0.0);
    matrix.e = -bounds.x0 * sx;
    matrix.f = -bounds.y0 * sy;
    matrix
}

/// 把 mupdf 的 pixmap 转成紧凑排列的 RGBA 字节
pub fn mupdf_to_pixels(pixmap: &Pixmap) -> (Vec<u8>, u32, u32) {
    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize; // 每个像素的组件数

    let stride = if height == 0 { 0 } else { samples.len() / height };

    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        let row = y * stride;
        for x in 0..width {
            let idx = row + x * n;
            let px = samples.get(idx..idx + n).unwrap_or(&[]);
            match *px {
                [r, g, b, a] => pixels.extend_from_slice(&[r, g, b, a]),
                [r, g, b] => pixels.extend_from_slice(&[r, g, b, 255]),
                // 灰度（可能带 alpha）
                [v, a] => pixels.extend_from_slice(&[v, v, v, a]),
                [v] => pixels.extend_from_slice(&[v, v, v, 255]),
                _ => pixels.extend_from_slice(&[255, 255, 255, 255]),
            }
        }
    }

    (pixels, width as u32, height as u32)
}
