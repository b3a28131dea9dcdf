use std::{fs::File, io::BufWriter, path::Path};

use anyhow::Context;

/// Packed 0xAARRGGBB colors to RGBA8 bytes. Row 0 of the kernel output is the
/// bottom of the image, so rows are flipped.
pub fn argb_to_rgba(colors: &[u32], width: u32, height: u32) -> Vec<u8> {
    let width = width as usize;
    let mut bytes = Vec::with_capacity(colors.len() * 4);
    for y in (0..height as usize).rev() {
        for &argb in &colors[y * width..(y + 1) * width] {
            let [a, r, g, b] = argb.to_be_bytes();
            bytes.extend_from_slice(&[r, g, b, a]);
        }
    }
    bytes
}

pub fn save_png(colors: &[u32], width: u32, height: u32, output_path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = output_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let file = File::create(output_path).with_context(|| format!("failed to create {}", output_path.display()))?;

    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder.write_header().context("failed to write PNG header")?;
    writer
        .write_image_data(&argb_to_rgba(colors, width, height))
        .context("failed to write PNG data")?;
    writer.finish().context("failed to finish PNG")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_are_reordered_and_rows_flipped() {
        // 1x2: bottom row red, top row blue
        let colors = [0xffff0000, 0x800000ff];
        let bytes = argb_to_rgba(&colors, 1, 2);
        assert_eq!(bytes, vec![0, 0, 255, 0x80, 255, 0, 0, 255]);
    }
}
