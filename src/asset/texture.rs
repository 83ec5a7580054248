use crate::error::{RenderError, Result};

/// Decoded texture pixels, 8 bits per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    /// 1 (grey), 3 (RGB) or 4 (RGBA).
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Result<Self> {
        let texture = Self {
            width,
            height,
            channels,
            pixels,
        };
        texture.validate()?;
        Ok(texture)
    }

    /// 1x1 RGBA texture of one colour.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            channels: 4,
            pixels: rgba.to_vec(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidTexture(format!(
                "zero-sized texture {}x{}",
                self.width, self.height
            )));
        }
        if !matches!(self.channels, 1 | 3 | 4) {
            return Err(RenderError::InvalidTexture(format!(
                "unsupported channel count {}",
                self.channels
            )));
        }
        let expected = self.width as usize * self.height as usize * self.channels as usize;
        if self.pixels.len() != expected {
            return Err(RenderError::InvalidTexture(format!(
                "expected {} bytes, got {}",
                expected,
                self.pixels.len()
            )));
        }
        Ok(())
    }

    /// Pixels expanded to RGBA8.
    pub fn to_rgba8(&self) -> Vec<u8> {
        match self.channels {
            4 => self.pixels.clone(),
            3 => self
                .pixels
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
            _ => self.pixels.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_expands_to_opaque_rgba() {
        let texture = TextureData::new(2, 1, 3, vec![1, 2, 3, 4, 5, 6]).expect("valid texture");
        assert_eq!(texture.to_rgba8(), vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn mismatched_length_is_rejected() {
        assert!(TextureData::new(2, 2, 4, vec![0; 3]).is_err());
        assert!(TextureData::new(1, 1, 2, vec![0; 2]).is_err());
    }
}
