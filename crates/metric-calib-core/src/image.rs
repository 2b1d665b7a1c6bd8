#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Black image of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: u8) {
        self.data[y * self.width + x] = v;
    }
}

impl GrayImageView<'_> {
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.width > 0
            && self.height > 0
            && x >= 0.0
            && y >= 0.0
            && x <= (self.width - 1) as f64
            && y <= (self.height - 1) as f64
    }
}

// Out-of-range reads replicate the border pixel.
#[inline]
fn get_gray_clamped(src: &GrayImageView<'_>, x: i64, y: i64) -> u8 {
    let x = x.clamp(0, src.width as i64 - 1) as usize;
    let y = y.clamp(0, src.height as i64 - 1) as usize;
    src.data[y * src.width + x]
}

/// Bilinear intensity at `(x, y)` with pixel centers on integer coordinates.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f64, y: f64) -> f64 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = get_gray_clamped(src, x0, y0) as f64;
    let p10 = get_gray_clamped(src, x0 + 1, y0) as f64;
    let p01 = get_gray_clamped(src, x0, y0 + 1) as f64;
    let p11 = get_gray_clamped(src, x0 + 1, y0 + 1) as f64;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// Bilinear sample rounded to `u8`, or `None` when `(x, y)` falls outside the image.
#[inline]
pub fn sample_bilinear_u8(src: &GrayImageView<'_>, x: f64, y: f64) -> Option<u8> {
    if !src.contains(x, y) {
        return None;
    }
    Some(sample_bilinear(src, x, y).round().clamp(0.0, 255.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> GrayImage {
        let mut img = GrayImage::new(4, 3);
        for y in 0..3 {
            for x in 0..4 {
                img.set(x, y, (x * 10 + y * 50) as u8);
            }
        }
        img
    }

    #[test]
    fn bilinear_interpolates_linear_ramp_exactly() {
        let img = ramp();
        let v = img.view();
        assert!((sample_bilinear(&v, 1.5, 0.0) - 15.0).abs() < 1e-12);
        assert!((sample_bilinear(&v, 2.25, 1.5) - (22.5 + 75.0)).abs() < 1e-12);
    }

    #[test]
    fn bilinear_clamps_outside_and_u8_variant_rejects() {
        let img = ramp();
        let v = img.view();
        assert_eq!(sample_bilinear(&v, -3.0, -3.0), 0.0);
        assert_eq!(sample_bilinear_u8(&v, -0.5, 1.0), None);
        assert_eq!(sample_bilinear_u8(&v, 3.0, 2.0), Some(130));
    }
}
