//! # Sensor Chart Rendering
//!
//! Renders an [`AlignedTable`] as one line chart per channel, either as ASCII
//! text for the terminal or onto any `embedded-graphics` draw target.
//!
//! Both renderers place points by **time**, not by row index: the leftmost
//! column is the first timestamp in the table and the rightmost the last, so
//! irregular sampling shows up as irregular spacing. Each channel is scaled to
//! its own value range since light, moisture and temperature share no unit.
//! Channels with no samples in the window are labelled "no data".

use crate::{AlignedTable, Channel, Timestamp};
use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Circle, Polyline, PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};

const TIME_FORMAT: &str = "%m-%d %H:%M";

/// Width of the y-axis label column in ASCII charts
const Y_AXIS_WIDTH: usize = 8;

/// Position of `time` within `[start, end]` as a fraction in `0.0..=1.0`.
fn time_fraction(time: &Timestamp, start: &Timestamp, end: &Timestamp) -> f64 {
    let span = (*end - *start).num_milliseconds();
    if span <= 0 {
        return 0.5;
    }
    (*time - *start).num_milliseconds() as f64 / span as f64
}

/// Position of `val` within `[min, max]`; flat series sit in the middle.
fn value_fraction(val: f64, min: f64, max: f64) -> f64 {
    if max > min {
        (val - min) / (max - min)
    } else {
        0.5
    }
}

/// Render the table as stacked ASCII charts, one per channel.
///
/// `rows` is the chart height per channel and `width` the number of plot
/// columns.
pub fn render_ascii(table: &AlignedTable, rows: usize, width: usize) -> String {
    let Some((start, end)) = table.time_span() else {
        return "no sensor logs in this window\n".to_string();
    };
    let rows = rows.max(2);
    let width = width.max(2);
    let mut out = String::new();

    for channel in Channel::ALL {
        let Some((min, max)) = table.value_range(channel) else {
            out.push_str(&format!("{channel}: no data\n\n"));
            continue;
        };
        out.push_str(&format!("{channel}  [{min:.1} .. {max:.1}]\n"));

        let mut grid = vec![vec![' '; width]; rows];
        for (_, time, val) in table.channel_values(channel) {
            let col = (time_fraction(time, start, end) * (width - 1) as f64).round() as usize;
            let row = ((1.0 - value_fraction(val, min, max)) * (rows - 1) as f64).round() as usize;
            grid[row.min(rows - 1)][col.min(width - 1)] = '•';
        }

        for (i, line) in grid.into_iter().enumerate() {
            let label = if i == 0 {
                format!("{max:>w$.1}", w = Y_AXIS_WIDTH - 1)
            } else if i == rows - 1 {
                format!("{min:>w$.1}", w = Y_AXIS_WIDTH - 1)
            } else {
                " ".repeat(Y_AXIS_WIDTH - 1)
            };
            out.push_str(&label);
            out.push('│');
            out.extend(line);
            out.push('\n');
        }
        out.push_str(&" ".repeat(Y_AXIS_WIDTH - 1));
        out.push('└');
        out.push_str(&"─".repeat(width));
        out.push_str("\n\n");
    }

    // Time labels under the last chart
    let first = start.format(TIME_FORMAT).to_string();
    let last = end.format(TIME_FORMAT).to_string();
    let gap = (width + 1).saturating_sub(first.len() + last.len()).max(1);
    out.push_str(&" ".repeat(Y_AXIS_WIDTH - 1));
    out.push_str(&first);
    out.push_str(&" ".repeat(gap));
    out.push_str(&last);
    out.push('\n');
    out
}

/// Draw the table as three stacked line charts filling `display`.
pub fn draw_chart<D>(table: &AlignedTable, display: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let size = display.bounding_box().size;
    let width = size.width as i32;
    let text_style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
    let stroke = PrimitiveStyle::with_stroke(BinaryColor::On, 1);

    // Bottom strip holds the time labels
    let footer = 12;
    let panel_height = (size.height as i32 - footer) / Channel::ALL.len() as i32;
    if panel_height < 20 || width < 20 {
        return Ok(());
    }

    let span = table.time_span();
    for (index, channel) in Channel::ALL.into_iter().enumerate() {
        let top = index as i32 * panel_height;
        Rectangle::new(
            Point::new(0, top),
            Size::new(width as u32, (panel_height - 2) as u32),
        )
        .into_styled(stroke)
        .draw(display)?;

        let range = table.value_range(channel);
        let label = match range {
            Some((min, max)) => format!("{channel} {min:.1}-{max:.1}"),
            None => format!("{channel}: no data"),
        };
        Text::with_baseline(&label, Point::new(3, top + 2), text_style, Baseline::Top)
            .draw(display)?;

        let (Some((min, max)), Some((start, end))) = (range, span) else {
            continue;
        };

        // Plot area inside the panel, below the label
        let left = 3;
        let plot_width = (width - 7) as f64;
        let bottom = top + panel_height - 6;
        let plot_height = (panel_height - 20) as f64;

        let points: Vec<Point> = table
            .channel_values(channel)
            .map(|(_, time, val)| {
                let x = left + (time_fraction(time, start, end) * plot_width).round() as i32;
                let y = bottom - (value_fraction(val, min, max) * plot_height).round() as i32;
                Point::new(x, y)
            })
            .collect();

        if let [only] = points.as_slice() {
            Circle::with_center(*only, 3)
                .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
                .draw(display)?;
        } else {
            Polyline::new(&points).into_styled(stroke).draw(display)?;
        }
    }

    if let Some((start, end)) = span {
        let baseline_y = size.height as i32 - footer + 1;
        let first = start.format(TIME_FORMAT).to_string();
        let last = end.format(TIME_FORMAT).to_string();
        Text::with_baseline(&first, Point::new(0, baseline_y), text_style, Baseline::Top)
            .draw(display)?;
        let last_x = width - (last.len() as i32 * 6);
        Text::with_baseline(&last, Point::new(last_x, baseline_y), text_style, Baseline::Top)
            .draw(display)?;
    }

    Ok(())
}

/// In-memory monochrome framebuffer.
///
/// Pixels are packed 8 per byte, most significant bit first, one padded row of
/// bytes per scanline; a set bit is ink. That is exactly the raster layout of a
/// binary PBM (`P4`) image, so [`to_pbm`](Self::to_pbm) is a header plus the
/// buffer.
#[derive(Clone, Debug)]
pub struct Canvas {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let bytes_per_row = width.div_ceil(8);
        Self {
            width,
            height,
            buffer: vec![0x00; (bytes_per_row * height) as usize],
        }
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, on: bool) {
        if x >= self.width || y >= self.height {
            return;
        }
        let bytes_per_row = self.width.div_ceil(8);
        let byte_index = (y * bytes_per_row + x / 8) as usize;
        let bit_mask = 0x80 >> (x % 8);
        if on {
            self.buffer[byte_index] |= bit_mask;
        } else {
            self.buffer[byte_index] &= !bit_mask;
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let byte_index = (y * self.width.div_ceil(8) + x / 8) as usize;
        self.buffer[byte_index] & (0x80 >> (x % 8)) != 0
    }

    /// Number of inked pixels.
    pub fn ink(&self) -> u32 {
        self.buffer.iter().map(|b| b.count_ones()).sum()
    }

    /// Encode as a binary PBM image.
    pub fn to_pbm(&self) -> Vec<u8> {
        let mut out = format!("P4\n{} {}\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.buffer);
        out
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Canvas {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x >= 0 && point.y >= 0 {
                self.set_pixel(point.x as u32, point.y as u32, color.is_on());
            }
        }
        Ok(())
    }
}
