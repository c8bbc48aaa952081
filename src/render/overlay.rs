use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::{DetectionRecord, DetectionSet};
use crate::render::color::ColorAssigner;
use crate::render::font::{BitmapFont, LabelFont};

/// Fixed drawing parameters.
#[derive(Clone, Copy, Debug)]
pub struct OverlayStyle {
    /// Box outline thickness in pixels, drawn inward from the box edge.
    pub stroke_width: u32,
    /// Space between label text and the edge of its background.
    pub label_padding: u32,
    pub text_color: Rgb<u8>,
    pub fps_color: Rgb<u8>,
    /// Top-left corner of the FPS readout.
    pub fps_origin: (i32, i32),
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            stroke_width: 2,
            label_padding: 2,
            text_color: Rgb([255, 255, 255]),
            fps_color: Rgb([0, 255, 0]),
            fps_origin: (10, 10),
        }
    }
}

/// Draws detection boxes and labels onto copies of images.
pub struct OverlayRenderer {
    style: OverlayStyle,
    font: Box<dyn LabelFont>,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(OverlayStyle::default())
    }
}

impl OverlayRenderer {
    /// Renderer using the built-in bitmap font at 2x.
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            style,
            font: Box::new(BitmapFont::new(2)),
        }
    }

    pub fn with_font(mut self, font: Box<dyn LabelFont>) -> Self {
        self.font = font;
        self
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Annotated copy of `image` with every record scoring at least
    /// `display_threshold`, drawn in set order.
    pub fn render(
        &self,
        image: &RgbImage,
        detections: &DetectionSet,
        display_threshold: f32,
        colors: &mut ColorAssigner,
    ) -> RgbImage {
        let mut canvas = image.clone();
        if canvas.width() == 0 || canvas.height() == 0 {
            return canvas;
        }
        let mut drawn = 0usize;
        for record in detections.above(display_threshold) {
            let color = colors.color_for(record.label());
            self.draw_record(&mut canvas, record, color);
            drawn += 1;
        }
        log::trace!(
            "rendered {}/{} detections (display threshold {:.2})",
            drawn,
            detections.len(),
            display_threshold
        );
        canvas
    }

    /// Draw `"FPS: {fps:.1}"` at the top-left of `canvas`.
    pub fn draw_fps(&self, canvas: &mut RgbImage, fps: f64) {
        let (x, y) = self.style.fps_origin;
        self.font
            .draw_text(canvas, self.style.fps_color, x, y, &format!("FPS: {:.1}", fps));
    }

    fn draw_record(&self, canvas: &mut RgbImage, record: &DetectionRecord, color: Rgb<u8>) {
        let (width, height) = (canvas.width() as i32, canvas.height() as i32);
        let [x1, y1, x2, y2] = record.bbox();
        let left = (x1.round() as i32).clamp(0, width - 1);
        let top = (y1.round() as i32).clamp(0, height - 1);
        let right = (x2.round() as i32).clamp(0, width - 1);
        let bottom = (y2.round() as i32).clamp(0, height - 1);

        for inset in 0..self.style.stroke_width as i32 {
            let w = right - left + 1 - 2 * inset;
            let h = bottom - top + 1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            draw_hollow_rect_mut(
                canvas,
                Rect::at(left + inset, top + inset).of_size(w as u32, h as u32),
                color,
            );
        }

        let caption = record.caption();
        let (text_w, text_h) = self.font.text_size(&caption);
        if text_w == 0 || text_h == 0 {
            return;
        }
        let pad = self.style.label_padding as i32;
        let label_w = text_w as i32 + 2 * pad;
        let label_h = text_h as i32 + 2 * pad;
        let (label_x, label_y) = label_origin((left, top), (label_w, label_h), (width, height));

        draw_filled_rect_mut(
            canvas,
            Rect::at(label_x, label_y).of_size(label_w as u32, label_h as u32),
            color,
        );
        self.font.draw_text(
            canvas,
            self.style.text_color,
            label_x + pad,
            label_y + pad,
            &caption,
        );
    }
}

/// Top-left corner of a label background for a box whose top-left is `anchor`.
///
/// The label sits on top of the box edge; without room above it moves inside the
/// box, and it is shifted left so it never crosses the right border.
fn label_origin(anchor: (i32, i32), label: (i32, i32), canvas: (i32, i32)) -> (i32, i32) {
    let (left, top) = anchor;
    let (label_w, label_h) = label;
    let (width, height) = canvas;

    let y = if top - label_h >= 0 { top - label_h } else { top };
    let y = y.min(height - label_h).max(0);
    let x = left.min(width - label_w).max(0);
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn set(records: &[(&str, f32, [f32; 4])], size: (u32, u32)) -> DetectionSet {
        DetectionSet::from_records(
            size,
            records
                .iter()
                .map(|(l, s, b)| DetectionRecord::new(*l, *s, *b).expect("record"))
                .collect(),
        )
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, (x ^ y) as u8]))
    }

    #[test]
    fn nothing_above_threshold_leaves_image_untouched() {
        let image = gradient(64, 48);
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(1);

        let empty = renderer.render(&image, &DetectionSet::new((64, 48)), 0.0, &mut colors);
        assert_eq!(empty, image);

        let low = set(&[("cat", 0.4, [5.0, 5.0, 20.0, 20.0])], (64, 48));
        assert_eq!(renderer.render(&image, &low, 0.5, &mut colors), image);
        assert!(colors.is_empty());
    }

    #[test]
    fn display_threshold_selects_records() {
        let image = RgbImage::new(100, 100);
        let detections = set(
            &[
                ("cat", 0.91, [10.0, 10.0, 50.0, 50.0]),
                ("cat", 0.60, [60.0, 10.0, 90.0, 50.0]),
            ],
            (100, 100),
        );
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(7);

        let out = renderer.render(&image, &detections, 0.7, &mut colors);
        let cat = colors.get("cat").expect("cat registered");

        assert_eq!(*out.get_pixel(10, 40), cat);
        assert_eq!(*out.get_pixel(50, 40), cat);
        assert_eq!(*out.get_pixel(60, 40), BLACK);
        assert_eq!(*out.get_pixel(90, 40), BLACK);
        assert_eq!(colors.len(), 1);
    }

    #[test]
    fn stroke_is_two_pixels_inward() {
        let image = RgbImage::new(60, 60);
        let detections = set(&[("dog", 0.9, [20.0, 30.0, 50.0, 55.0])], (60, 60));
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(3);

        let out = renderer.render(&image, &detections, 0.5, &mut colors);
        let dog = colors.get("dog").expect("dog registered");
        assert_eq!(*out.get_pixel(20, 45), dog);
        assert_eq!(*out.get_pixel(21, 45), dog);
        assert_eq!(*out.get_pixel(22, 45), BLACK);
        assert_eq!(*out.get_pixel(19, 45), BLACK);
    }

    #[test]
    fn rendering_is_deterministic() {
        let image = gradient(120, 90);
        let detections = set(
            &[
                ("person", 0.99, [3.0, 4.0, 70.0, 80.0]),
                ("bicycle", 0.75, [50.0, 30.0, 118.0, 88.0]),
            ],
            (120, 90),
        );
        let renderer = OverlayRenderer::default();

        let mut first_colors = ColorAssigner::with_seed(42);
        let first = renderer.render(&image, &detections, 0.5, &mut first_colors);
        let again = renderer.render(&image, &detections, 0.5, &mut first_colors);
        let mut other_colors = ColorAssigner::with_seed(42);
        let other = renderer.render(&image, &detections, 0.5, &mut other_colors);

        assert_eq!(first.as_raw(), again.as_raw());
        assert_eq!(first.as_raw(), other.as_raw());
        assert_ne!(first.as_raw(), image.as_raw());
    }

    #[test]
    fn label_sits_above_box_when_there_is_room() {
        let image = RgbImage::new(100, 100);
        let detections = set(&[("cat", 0.91, [20.0, 40.0, 60.0, 80.0])], (100, 100));
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(5);

        let out = renderer.render(&image, &detections, 0.0, &mut colors);
        let cat = colors.get("cat").expect("cat registered");
        // 2x bitmap font: 14 px text + 2 px padding on each side.
        assert_eq!(*out.get_pixel(21, 40 - 18 + 1), cat);
        assert_eq!(*out.get_pixel(21, 40 - 19), BLACK);
    }

    #[test]
    fn label_moves_inside_box_at_image_top() {
        let image = RgbImage::new(100, 100);
        let detections = set(&[("cat", 0.91, [10.0, 0.0, 60.0, 50.0])], (100, 100));
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(5);

        let out = renderer.render(&image, &detections, 0.0, &mut colors);
        let cat = colors.get("cat").expect("cat registered");
        assert_eq!(*out.get_pixel(12, 17), cat);
        assert_eq!(*out.get_pixel(12, 19), BLACK);
    }

    #[test]
    fn label_shifts_left_at_right_edge() {
        let image = RgbImage::new(200, 100);
        let detections = set(&[("cat", 0.91, [180.0, 60.0, 199.0, 90.0])], (200, 100));
        let renderer = OverlayRenderer::default();
        let mut colors = ColorAssigner::with_seed(5);

        let out = renderer.render(&image, &detections, 0.0, &mut colors);
        let cat = colors.get("cat").expect("cat registered");
        // "cat: 0.91" is 9 glyphs: 9 * 12 - 2 = 106 px, plus padding = 110.
        assert_eq!(*out.get_pixel(90, 43), cat);
        assert_eq!(*out.get_pixel(199, 43), cat);
        assert_eq!(*out.get_pixel(89, 43), BLACK);
    }

    #[test]
    fn label_origin_clamps_to_canvas() {
        assert_eq!(label_origin((10, 40), (30, 10), (100, 100)), (10, 30));
        assert_eq!(label_origin((10, 5), (30, 10), (100, 100)), (10, 5));
        assert_eq!(label_origin((90, 5), (30, 10), (100, 100)), (70, 5));
        assert_eq!(label_origin((0, 0), (300, 200), (100, 100)), (0, 0));
        assert_eq!(label_origin((0, 95), (30, 10), (100, 100)), (0, 85));
    }

    #[test]
    fn fps_readout_is_green() {
        let mut canvas = RgbImage::new(120, 40);
        let renderer = OverlayRenderer::default();
        renderer.draw_fps(&mut canvas, 29.97);

        let green = renderer.style().fps_color;
        assert!(canvas.pixels().any(|p| *p == green));
        assert!(canvas.pixels().all(|p| *p == green || *p == BLACK));
    }
}
