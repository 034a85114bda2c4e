//! Middlebury `.flo` ground-truth files: little-endian, a float sanity tag,
//! then width, height, and interleaved (u, v) pairs in raster order.

use crate::error::{FlowError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array3;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Written as a float at the head of every file. Reads back as garbage on a
/// byte-order mismatch, which is the point.
pub const FLO_TAG: f32 = 202021.25;

const MAX_DIMENSION: u32 = 99_999;

/// Reads one flow field as `[h, w, 2]`.
pub fn read_flo<P: AsRef<Path>>(path: P) -> Result<Array3<f32>> {
	let path = path.as_ref();
	let file = File::open(path)
		.map_err(|e| FlowError::FileNotFound(format!("{}: {}", path.display(), e)))?;
	let mut reader = BufReader::new(file);
	read_flo_from(&mut reader).map_err(|e| match e {
		FlowError::Parse(msg) => FlowError::Parse(format!("{}: {}", path.display(), msg)),
		other => other,
	})
}

pub fn read_flo_from<R: Read>(reader: &mut R) -> Result<Array3<f32>> {
	let tag = reader.read_f32::<LittleEndian>()?;
	if tag != FLO_TAG {
		return Err(FlowError::Parse(format!(
			"bad flow file tag {} (expected {})",
			tag, FLO_TAG
		)));
	}
	let width = reader.read_u32::<LittleEndian>()?;
	let height = reader.read_u32::<LittleEndian>()?;
	if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
		return Err(FlowError::Parse(format!(
			"implausible flow dimensions {}x{}",
			width, height
		)));
	}
	let (width, height) = (width as usize, height as usize);
	let mut data = vec![0.0f32; height * width * 2];
	reader.read_f32_into::<LittleEndian>(&mut data)?;
	Array3::from_shape_vec((height, width, 2), data)
		.map_err(|e| FlowError::Parse(format!("flow buffer: {}", e)))
}

/// Writes one `[h, w, 2]` flow field.
pub fn write_flo<P: AsRef<Path>>(path: P, flow: &Array3<f32>) -> Result<()> {
	let file = File::create(path.as_ref())?;
	let mut writer = BufWriter::new(file);
	write_flo_to(&mut writer, flow)
}

pub fn write_flo_to<W: Write>(writer: &mut W, flow: &Array3<f32>) -> Result<()> {
	let (height, width, channels) = flow.dim();
	if channels != 2 {
		return Err(FlowError::ShapeMismatch(format!(
			"flow field must have 2 channels, got {}",
			channels
		)));
	}
	writer.write_f32::<LittleEndian>(FLO_TAG)?;
	writer.write_u32::<LittleEndian>(width as u32)?;
	writer.write_u32::<LittleEndian>(height as u32)?;
	for y in 0..height {
		for x in 0..width {
			writer.write_f32::<LittleEndian>(flow[[y, x, 0]])?;
			writer.write_f32::<LittleEndian>(flow[[y, x, 1]])?;
		}
	}
	writer.flush()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use ndarray::Array3;
	use std::io::Cursor;

	#[test]
	fn round_trip_preserves_values_and_shape() {
		let flow = Array3::from_shape_fn((3, 5, 2), |(y, x, c)| {
			(y * 10 + x) as f32 * if c == 0 { 1.0 } else { -0.5 }
		});
		let mut buf = Vec::new();
		write_flo_to(&mut buf, &flow).unwrap();
		let back = read_flo_from(&mut Cursor::new(buf)).unwrap();
		assert_eq!(back.dim(), (3, 5, 2));
		assert_eq!(back, flow);
	}

	#[test]
	fn bad_tag_is_rejected() {
		let flow = Array3::zeros((2, 2, 2));
		let mut buf = Vec::new();
		write_flo_to(&mut buf, &flow).unwrap();
		buf[0] ^= 0xff;
		assert!(read_flo_from(&mut Cursor::new(buf)).is_err());
	}

	#[test]
	fn truncated_payload_is_an_error() {
		let flow = Array3::zeros((4, 4, 2));
		let mut buf = Vec::new();
		write_flo_to(&mut buf, &flow).unwrap();
		buf.truncate(buf.len() - 8);
		assert!(read_flo_from(&mut Cursor::new(buf)).is_err());
	}

	#[test]
	fn single_channel_field_cannot_be_written() {
		let flow = Array3::zeros((2, 2, 1));
		let mut buf = Vec::new();
		assert!(write_flo_to(&mut buf, &flow).is_err());
	}
}
