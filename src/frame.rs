use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

/// Pixel layout of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorLayout {
    /// 8-bit single channel
    Gray,
    /// 8-bit interleaved RGB
    Rgb,
}

impl ColorLayout {
    pub fn channels(self) -> usize {
        match self {
            ColorLayout::Gray => 1,
            ColorLayout::Rgb => 3,
        }
    }

    pub fn is_color(self) -> bool {
        self == ColorLayout::Rgb
    }
}

/// A single video frame
///
/// Frames are plain values: a capture handle hands out a fresh frame per
/// read and a writer only borrows the frame for the duration of a write.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Gray(GrayImage),
    Rgb(RgbImage),
}

impl Frame {
    /// Create a new colour frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        Frame::Rgb(ImageBuffer::new(width, height))
    }

    /// Create a new colour frame filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        Frame::Rgb(ImageBuffer::from_pixel(width, height, Rgb(color)))
    }

    /// Create a new grayscale frame filled with `level`
    pub fn new_gray(width: u32, height: u32, level: u8) -> Self {
        Frame::Gray(ImageBuffer::from_pixel(width, height, Luma([level])))
    }

    /// Create a frame from raw interleaved bytes
    pub fn from_raw(width: u32, height: u32, layout: ColorLayout, data: Vec<u8>) -> Option<Self> {
        match layout {
            ColorLayout::Gray => ImageBuffer::from_raw(width, height, data).map(Frame::Gray),
            ColorLayout::Rgb => ImageBuffer::from_raw(width, height, data).map(Frame::Rgb),
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Frame::Gray(img) => img.width(),
            Frame::Rgb(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Frame::Gray(img) => img.height(),
            Frame::Rgb(img) => img.height(),
        }
    }

    /// (width, height)
    pub fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn layout(&self) -> ColorLayout {
        match self {
            Frame::Gray(_) => ColorLayout::Gray,
            Frame::Rgb(_) => ColorLayout::Rgb,
        }
    }

    pub fn is_color(&self) -> bool {
        self.layout().is_color()
    }

    /// Get a pixel as RGB; gray pixels are replicated across channels
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        match self {
            Frame::Gray(img) => {
                let l = img.get_pixel(x, y)[0];
                [l, l, l]
            }
            Frame::Rgb(img) => img.get_pixel(x, y).0,
        }
    }

    /// Set a pixel; on gray frames the color is reduced to its luma
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        match self {
            Frame::Gray(img) => img.put_pixel(x, y, Luma([luma(color)])),
            Frame::Rgb(img) => img.put_pixel(x, y, Rgb(color)),
        }
    }

    /// Raw interleaved pixel bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Gray(img) => img.as_raw(),
            Frame::Rgb(img) => img.as_raw(),
        }
    }

    /// Convert to a colour frame
    pub fn to_rgb(&self) -> Frame {
        match self {
            Frame::Gray(img) => Frame::Rgb(DynamicImage::ImageLuma8(img.clone()).to_rgb8()),
            Frame::Rgb(_) => self.clone(),
        }
    }

    /// Convert to a grayscale frame
    pub fn to_gray(&self) -> Frame {
        match self {
            Frame::Gray(_) => self.clone(),
            Frame::Rgb(img) => Frame::Gray(DynamicImage::ImageRgb8(img.clone()).to_luma8()),
        }
    }

    pub(crate) fn to_dynamic(&self) -> DynamicImage {
        match self {
            Frame::Gray(img) => DynamicImage::ImageLuma8(img.clone()),
            Frame::Rgb(img) => DynamicImage::ImageRgb8(img.clone()),
        }
    }

    /// Wrap a decoded image, converting it to the requested layout
    pub(crate) fn from_dynamic(image: DynamicImage, layout: ColorLayout) -> Frame {
        match (layout, image) {
            (ColorLayout::Gray, DynamicImage::ImageLuma8(img)) => Frame::Gray(img),
            (ColorLayout::Gray, other) => Frame::Gray(other.to_luma8()),
            (ColorLayout::Rgb, DynamicImage::ImageRgb8(img)) => Frame::Rgb(img),
            (ColorLayout::Rgb, other) => Frame::Rgb(other.to_rgb8()),
        }
    }

    /// Save the frame as an image file, format inferred from the extension
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), image::ImageError> {
        match self {
            Frame::Gray(img) => img.save(path),
            Frame::Rgb(img) => img.save(path),
        }
    }
}

fn luma(color: [u8; 3]) -> u8 {
    let [r, g, b] = color.map(u32::from);
    ((r * 299 + g * 587 + b * 114 + 500) / 1000) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_and_layout() {
        let frame = Frame::new_filled(32, 16, [10, 20, 30]);
        assert_eq!(frame.size(), (32, 16));
        assert!(frame.is_color());
        assert_eq!(frame.as_bytes().len(), 32 * 16 * 3);
        assert_eq!(frame.get_pixel(5, 5), [10, 20, 30]);

        let gray = Frame::new_gray(8, 4, 200);
        assert_eq!(gray.layout(), ColorLayout::Gray);
        assert_eq!(gray.as_bytes().len(), 32);
        assert_eq!(gray.get_pixel(0, 0), [200, 200, 200]);
    }

    #[test]
    fn test_from_raw_checks_length() {
        assert!(Frame::from_raw(2, 2, ColorLayout::Rgb, vec![0; 12]).is_some());
        assert!(Frame::from_raw(2, 2, ColorLayout::Rgb, vec![0; 11]).is_none());
        assert!(Frame::from_raw(2, 2, ColorLayout::Gray, vec![0; 4]).is_some());
    }

    #[test]
    fn test_layout_conversion() {
        let white = Frame::new_filled(4, 4, [255, 255, 255]);
        let gray = white.to_gray();
        assert_eq!(gray.layout(), ColorLayout::Gray);
        assert_eq!(gray.get_pixel(1, 1), [255, 255, 255]);
        assert_eq!(gray.to_rgb().layout(), ColorLayout::Rgb);
    }

    #[test]
    fn test_set_pixel_on_gray_uses_luma() {
        let mut frame = Frame::new_gray(2, 2, 0);
        frame.set_pixel(1, 1, [255, 255, 255]);
        assert_eq!(frame.get_pixel(1, 1), [255, 255, 255]);
        frame.set_pixel(0, 0, [0, 0, 0]);
        assert_eq!(frame.get_pixel(0, 0), [0, 0, 0]);
    }
}
