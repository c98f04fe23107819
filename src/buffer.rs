use image::{GrayImage, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::{Point, Rect};

pub const WHITE: u8 = 255;
pub const BLACK: u8 = 0;

/// Pure white as a colour value.
pub const WHITE_PIXEL: Rgb<u8> = Rgb([WHITE, WHITE, WHITE]);

/// Colour value with all three channels set to `value`.
pub const fn gray_pixel(value: u8) -> Rgb<u8> {
    Rgb([value, value, value])
}

/// Gray value at or below which a pixel counts as black.
pub fn black_max(black_threshold: f32) -> u8 {
    (WHITE as f32 * (1.0 - black_threshold)) as u8
}

/// Gray value below which a pixel counts as non-white.
pub fn white_min(white_threshold: f32) -> u8 {
    (WHITE as f32 * white_threshold) as u8
}

/// Average of the channels, or the shared value for pure greys.
pub fn grayscale(p: Rgb<u8>) -> u8 {
    let [r, g, b] = p.0;
    if r == g && r == b {
        r
    } else {
        ((r as u16 + g as u16 + b as u16) / 3) as u8
    }
}

/// Minimum channel: low if the pixel is dark in at least one channel.
pub fn lightness(p: Rgb<u8>) -> u8 {
    let [r, g, b] = p.0;
    r.min(g).min(b)
}

/// Maximum channel: low only if the pixel is dark in every channel.
pub fn darkness_inverse(p: Rgb<u8>) -> u8 {
    let [r, g, b] = p.0;
    r.max(g).max(b)
}

/// Nominal sample depth of a sheet. One-bit sheets are held as 0/255 bytes
/// and only binarized again on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitDepth {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "8")]
    Eight,
}

/// Raw samples plus, for colour sheets, the derived measurement planes.
///
/// For gray sheets the grayscale, lightness and darkness-inverse of a pixel
/// are all the raw sample, so no derived planes exist.
#[derive(Debug, Clone)]
enum Storage {
    Gray(GrayImage),
    Color {
        rgb: RgbImage,
        grayscale: GrayImage,
        lightness: GrayImage,
        darkness_inverse: GrayImage,
    },
}

#[derive(Debug, Clone, Copy)]
enum Plane {
    Grayscale,
    Lightness,
    DarknessInverse,
}

/// A sheet's raster. Reads outside the sheet return white; writes outside
/// the sheet are ignored.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    storage: Storage,
    bitdepth: BitDepth,
    background: u8,
}

impl PixelBuffer {
    /// Allocate a `width` x `height` buffer filled with `background`.
    pub fn new(
        width: u32,
        height: u32,
        bitdepth: BitDepth,
        color: bool,
        background: u8,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::geometry(width, height));
        }
        let plane = || GrayImage::from_pixel(width, height, Luma([background]));
        let storage = if color {
            Storage::Color {
                rgb: RgbImage::from_pixel(width, height, gray_pixel(background)),
                grayscale: plane(),
                lightness: plane(),
                darkness_inverse: plane(),
            }
        } else {
            Storage::Gray(plane())
        };
        Ok(Self {
            storage,
            bitdepth,
            background,
        })
    }

    /// Wrap decoded gray samples.
    pub fn from_gray(image: GrayImage, bitdepth: BitDepth, background: u8) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::geometry(image.width(), image.height()));
        }
        Ok(Self {
            storage: Storage::Gray(image),
            bitdepth,
            background,
        })
    }

    /// Wrap decoded colour samples, computing the derived planes.
    pub fn from_rgb(rgb: RgbImage, background: u8) -> Result<Self> {
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::geometry(width, height));
        }
        let derive = |f: fn(Rgb<u8>) -> u8| {
            GrayImage::from_fn(width, height, |x, y| Luma([f(*rgb.get_pixel(x, y))]))
        };
        let grayscale_plane = derive(grayscale);
        let lightness_plane = derive(lightness);
        let darkness_plane = derive(darkness_inverse);
        Ok(Self {
            storage: Storage::Color {
                rgb,
                grayscale: grayscale_plane,
                lightness: lightness_plane,
                darkness_inverse: darkness_plane,
            },
            bitdepth: BitDepth::Eight,
            background,
        })
    }

    /// Empty buffer of another size with the same depth, colour mode and background.
    pub fn blank_like(&self, width: u32, height: u32) -> Result<Self> {
        Self::new(width, height, self.bitdepth, self.is_color(), self.background)
    }

    pub fn width(&self) -> u32 {
        match &self.storage {
            Storage::Gray(img) => img.width(),
            Storage::Color { rgb, .. } => rgb.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match &self.storage {
            Storage::Gray(img) => img.height(),
            Storage::Color { rgb, .. } => rgb.height(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn bounds(&self) -> Rect {
        Rect::sheet(self.width(), self.height())
    }

    pub fn bitdepth(&self) -> BitDepth {
        self.bitdepth
    }

    pub fn set_bitdepth(&mut self, bitdepth: BitDepth) {
        self.bitdepth = bitdepth;
    }

    pub fn is_color(&self) -> bool {
        matches!(self.storage, Storage::Color { .. })
    }

    pub fn background(&self) -> u8 {
        self.background
    }

    pub fn set_background(&mut self, background: u8) {
        self.background = background;
    }

    /// Raw gray samples, if this is not a colour buffer.
    pub fn as_gray(&self) -> Option<&GrayImage> {
        match &self.storage {
            Storage::Gray(img) => Some(img),
            Storage::Color { .. } => None,
        }
    }

    /// Raw colour samples, if this is a colour buffer.
    pub fn as_rgb(&self) -> Option<&RgbImage> {
        match &self.storage {
            Storage::Gray(_) => None,
            Storage::Color { rgb, .. } => Some(rgb),
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<(u32, u32)> {
        if x < 0 || y < 0 || x as u32 >= self.width() || y as u32 >= self.height() {
            None
        } else {
            Some((x as u32, y as u32))
        }
    }

    /// Colour at `(x, y)`, white outside the sheet.
    pub fn get(&self, x: i32, y: i32) -> Rgb<u8> {
        let Some((x, y)) = self.index(x, y) else {
            return WHITE_PIXEL;
        };
        match &self.storage {
            Storage::Gray(img) => gray_pixel(img.get_pixel(x, y)[0]),
            Storage::Color { rgb, .. } => *rgb.get_pixel(x, y),
        }
    }

    fn plane(&self, plane: Plane, x: i32, y: i32) -> u8 {
        let Some((x, y)) = self.index(x, y) else {
            return WHITE;
        };
        match &self.storage {
            Storage::Gray(img) => img.get_pixel(x, y)[0],
            Storage::Color {
                grayscale,
                lightness,
                darkness_inverse,
                ..
            } => {
                let img = match plane {
                    Plane::Grayscale => grayscale,
                    Plane::Lightness => lightness,
                    Plane::DarknessInverse => darkness_inverse,
                };
                img.get_pixel(x, y)[0]
            }
        }
    }

    pub fn grayscale(&self, x: i32, y: i32) -> u8 {
        self.plane(Plane::Grayscale, x, y)
    }

    pub fn lightness(&self, x: i32, y: i32) -> u8 {
        self.plane(Plane::Lightness, x, y)
    }

    pub fn darkness_inverse(&self, x: i32, y: i32) -> u8 {
        self.plane(Plane::DarknessInverse, x, y)
    }

    /// Write a colour. Gray buffers store its grayscale value.
    ///
    /// Returns true if the stored pixel changed; false outside the sheet.
    pub fn set(&mut self, x: i32, y: i32, color: Rgb<u8>) -> bool {
        let Some((x, y)) = self.index(x, y) else {
            return false;
        };
        match &mut self.storage {
            Storage::Gray(img) => {
                let value = grayscale(color);
                let p = img.get_pixel_mut(x, y);
                if p[0] == value {
                    return false;
                }
                p[0] = value;
                true
            }
            Storage::Color {
                rgb,
                grayscale: gray_plane,
                lightness: light_plane,
                darkness_inverse: dark_plane,
            } => {
                let p = rgb.get_pixel_mut(x, y);
                if *p == color {
                    return false;
                }
                *p = color;
                gray_plane.put_pixel(x, y, Luma([grayscale(color)]));
                light_plane.put_pixel(x, y, Luma([lightness(color)]));
                dark_plane.put_pixel(x, y, Luma([darkness_inverse(color)]));
                true
            }
        }
    }

    /// Set every channel of `(x, y)` to `value`.
    pub fn set_black_or_white(&mut self, x: i32, y: i32, value: u8) -> bool {
        self.set(x, y, gray_pixel(value))
    }

    /// Set `(x, y)` to white.
    pub fn clear(&mut self, x: i32, y: i32) -> bool {
        self.set_black_or_white(x, y, WHITE)
    }

    /// Fill `rect` with `value`, returning how many pixels actually changed.
    pub fn fill_rect(&mut self, rect: Rect, value: u8) -> u64 {
        let mut count = 0;
        for y in rect.top..=rect.bottom {
            for x in rect.left..=rect.right {
                if self.set_black_or_white(x, y, value) {
                    count += 1;
                }
            }
        }
        count
    }

    /// Copy the pixels of `area` into `target` with the area's top-left
    /// corner landing on `to`. Parts outside either buffer are skipped or read
    /// as white.
    pub fn copy_area(&self, area: Rect, to: Point, target: &mut PixelBuffer) {
        for row in 0..area.height() {
            for col in 0..area.width() {
                let pixel = self.get(area.left + col, area.top + row);
                target.set(to.x + col, to.y + row, pixel);
            }
        }
    }

    /// Copy the whole buffer into `target` at `to`.
    pub fn copy_into(&self, to: Point, target: &mut PixelBuffer) {
        self.copy_area(self.bounds(), to, target);
    }

    /// Place `area` centred inside `into` on `target`. A smaller source is
    /// surrounded by the target's background, a larger one is cropped evenly.
    pub fn center_area(&self, area: Rect, into: Rect, target: &mut PixelBuffer) {
        let (mut x, mut y) = (area.left, area.top);
        let (mut w, mut h) = (area.width(), area.height());
        let (mut to_x, mut to_y) = (into.left, into.top);
        let (ww, hh) = (into.width(), into.height());
        if w < ww || h < hh {
            let background = target.background();
            target.fill_rect(into, background);
        }
        if w < ww {
            to_x += (ww - w) / 2;
        }
        if h < hh {
            to_y += (hh - h) / 2;
        }
        if w > ww {
            x += (w - ww) / 2;
            w = ww;
        }
        if h > hh {
            y += (h - hh) / 2;
            h = hh;
        }
        self.copy_area(Rect::from_size(x, y, w, h), Point::new(to_x, to_y), target);
    }

    /// Centre the whole buffer inside `into` on `target`.
    pub fn center_into(&self, into: Rect, target: &mut PixelBuffer) {
        self.center_area(self.bounds(), into, target);
    }

    fn average(&self, rect: Rect, plane: Plane) -> u8 {
        let count = rect.area();
        if count == 0 {
            return WHITE;
        }
        let mut total: i64 = 0;
        for y in rect.top..=rect.bottom {
            for x in rect.left..=rect.right {
                total += self.plane(plane, x, y) as i64;
            }
        }
        (total / count) as u8
    }

    /// Mean grayscale over `rect`, counting pixels outside the sheet as white.
    pub fn average_grayscale(&self, rect: Rect) -> u8 {
        self.average(rect, Plane::Grayscale)
    }

    pub fn average_lightness(&self, rect: Rect) -> u8 {
        self.average(rect, Plane::Lightness)
    }

    pub fn average_darkness_inverse(&self, rect: Rect) -> u8 {
        self.average(rect, Plane::DarknessInverse)
    }

    /// Count pixels in `rect` whose grayscale lies in `min..=max`, clearing
    /// each of them to white when `clear` is set.
    pub fn count_pixels(&mut self, rect: Rect, min: u8, max: u8, clear: bool) -> u64 {
        let mut count = 0;
        for y in rect.top..=rect.bottom {
            for x in rect.left..=rect.right {
                let pixel = self.grayscale(x, y);
                if pixel >= min && pixel <= max {
                    if clear {
                        self.clear(x, y);
                    }
                    count += 1;
                }
            }
        }
        count
    }

    /// Read-only variant of [`count_pixels`](Self::count_pixels).
    pub fn count_pixels_in(&self, rect: Rect, min: u8, max: u8) -> u64 {
        let mut count = 0;
        for y in rect.top..=rect.bottom {
            for x in rect.left..=rect.right {
                let pixel = self.grayscale(x, y);
                if pixel >= min && pixel <= max {
                    count += 1;
                }
            }
        }
        count
    }

    /// Colour copy of the samples; gray sheets are expanded to three channels.
    pub fn to_rgb(&self) -> RgbImage {
        match &self.storage {
            Storage::Gray(img) => RgbImage::from_fn(img.width(), img.height(), |x, y| {
                gray_pixel(img.get_pixel(x, y)[0])
            }),
            Storage::Color { rgb, .. } => rgb.clone(),
        }
    }
}
