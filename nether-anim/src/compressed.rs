//! Compressed animation and its binary container
//!
//! # Container layout
//! ```text
//! [ContainerHeader]                  28 bytes, little-endian
//! [track offsets]                    num_tracks * track_strip_size i32 (LE)
//! [scale offsets]                    scale_offset_count i32 (LE)
//! [byte stream]                      byte_stream_len bytes, in `byte_order`
//! ```
//!
//! Track offsets per track are `trans_offset, trans_count, rot_offset, rot_count`
//! for the legacy encodings and `trans_offset, rot_offset` for the per-track
//! encoding, where -1 marks an identity channel. Scale offsets use two entries
//! per track (legacy) or one (per-track), and are absent without scale.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::decoder::track_view;
use crate::error::CodecError;
use crate::formats::{
    ByteOrder, Channel, ChannelFormats, Format, Interpolation, KeyEncoding, TRACK_ALIGNMENT,
};

/// Output of an encoder: offset tables plus the packed key stream
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedAnimation {
    pub key_encoding: KeyEncoding,
    /// Sequence-level formats (legacy encodings only)
    pub formats: ChannelFormats,
    pub interpolation: Interpolation,
    pub byte_order: ByteOrder,
    pub num_frames: u32,
    pub sequence_length: f32,
    pub num_tracks: usize,
    pub track_offsets: Vec<i32>,
    pub scale_offsets: Vec<i32>,
    pub byte_stream: Vec<u8>,
}

impl CompressedAnimation {
    /// Size used to rank candidate encodings
    pub fn approx_compressed_size(&self) -> usize {
        4 * (self.track_offsets.len() + self.scale_offsets.len()) + self.byte_stream.len()
    }

    pub fn has_scale(&self) -> bool {
        !self.scale_offsets.is_empty()
    }

    /// Checks table sizes, alignment and that every track fits in the byte stream
    pub fn validate(&self) -> Result<(), CodecError> {
        let strip = self.key_encoding.track_strip_size();
        if self.track_offsets.len() != self.num_tracks * strip {
            return Err(CodecError::Malformed(format!(
                "{} track offsets for {} tracks",
                self.track_offsets.len(),
                self.num_tracks
            )));
        }
        let scale_strip = self.key_encoding.scale_strip_size();
        if self.has_scale() && self.scale_offsets.len() != self.num_tracks * scale_strip {
            return Err(CodecError::Malformed(format!(
                "{} scale offsets for {} tracks",
                self.scale_offsets.len(),
                self.num_tracks
            )));
        }
        if self.key_encoding != KeyEncoding::PerTrack {
            self.formats.validate_legacy()?;
        }

        for track in 0..self.num_tracks {
            for channel in [Channel::Translation, Channel::Rotation, Channel::Scale] {
                let Some(view) = track_view(self, track, channel)? else {
                    continue;
                };
                if view.start % TRACK_ALIGNMENT != 0 {
                    return Err(CodecError::Malformed(format!(
                        "{channel} track {track} starts at unaligned offset {}",
                        view.start
                    )));
                }
                let end = view.end(self.num_frames);
                if end > self.byte_stream.len() {
                    return Err(CodecError::Truncated {
                        expected: end,
                        found: self.byte_stream.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Container size in bytes
    pub fn serialized_size(&self) -> usize {
        ContainerHeader::SIZE + self.approx_compressed_size()
    }

    /// Write the container format
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let header = ContainerHeader {
            key_encoding: self.key_encoding,
            formats: self.formats,
            interpolation: self.interpolation,
            byte_order: self.byte_order,
            scale_strip_size: self.key_encoding.scale_strip_size() as u8,
            num_frames: self.num_frames,
            sequence_length: self.sequence_length,
            num_tracks: self.num_tracks as u32,
            byte_stream_len: self.byte_stream.len() as u32,
            scale_offset_count: self.scale_offsets.len() as u32,
        };
        header.write_to(&mut writer)?;
        for &offset in self.track_offsets.iter().chain(&self.scale_offsets) {
            writer.write_i32::<LittleEndian>(offset)?;
        }
        writer.write_all(&self.byte_stream)
    }

    /// Parse and validate a container
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let header = ContainerHeader::from_bytes(bytes)?;
        let num_tracks = header.num_tracks as usize;
        let track_count = num_tracks * header.key_encoding.track_strip_size();
        let scale_count = header.scale_offset_count as usize;
        let tables_end = ContainerHeader::SIZE + 4 * (track_count + scale_count);
        let expected = tables_end + header.byte_stream_len as usize;
        if bytes.len() < expected {
            return Err(CodecError::Truncated {
                expected,
                found: bytes.len(),
            });
        }

        let truncated = |_: io::Error| CodecError::Truncated {
            expected,
            found: bytes.len(),
        };
        let mut tables = &bytes[ContainerHeader::SIZE..tables_end];
        let mut track_offsets = vec![0i32; track_count];
        tables
            .read_i32_into::<LittleEndian>(&mut track_offsets)
            .map_err(truncated)?;
        let mut scale_offsets = vec![0i32; scale_count];
        tables
            .read_i32_into::<LittleEndian>(&mut scale_offsets)
            .map_err(truncated)?;

        let anim = Self {
            key_encoding: header.key_encoding,
            formats: header.formats,
            interpolation: header.interpolation,
            byte_order: header.byte_order,
            num_frames: header.num_frames,
            sequence_length: header.sequence_length,
            num_tracks,
            track_offsets,
            scale_offsets,
            byte_stream: bytes[tables_end..expected].to_vec(),
        };
        anim.validate()?;
        Ok(anim)
    }
}

// ============================================================================
// Container header
// ============================================================================

/// Fixed-size container header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerHeader {
    pub key_encoding: KeyEncoding,
    pub formats: ChannelFormats,
    pub interpolation: Interpolation,
    /// Byte order of the key stream (the container itself is always little-endian)
    pub byte_order: ByteOrder,
    pub scale_strip_size: u8,
    pub num_frames: u32,
    pub sequence_length: f32,
    pub num_tracks: u32,
    pub byte_stream_len: u32,
    pub scale_offset_count: u32,
}

impl ContainerHeader {
    pub const SIZE: usize = 28;

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&[
            self.key_encoding as u8,
            self.formats.translation as u8,
            self.formats.rotation as u8,
            self.formats.scale as u8,
            self.interpolation as u8,
            self.byte_order as u8,
            self.scale_strip_size,
            0, // reserved
        ])?;
        writer.write_u32::<LittleEndian>(self.num_frames)?;
        writer.write_f32::<LittleEndian>(self.sequence_length)?;
        writer.write_u32::<LittleEndian>(self.num_tracks)?;
        writer.write_u32::<LittleEndian>(self.byte_stream_len)?;
        writer.write_u32::<LittleEndian>(self.scale_offset_count)?;
        Ok(())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let truncated = |_: io::Error| CodecError::Truncated {
            expected: Self::SIZE,
            found: bytes.len(),
        };
        let mut reader = bytes;
        let mut tags = [0u8; 8];
        reader.read_exact(&mut tags).map_err(truncated)?;
        let num_frames = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        let sequence_length = reader.read_f32::<LittleEndian>().map_err(truncated)?;
        let num_tracks = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        let byte_stream_len = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        let scale_offset_count = reader.read_u32::<LittleEndian>().map_err(truncated)?;

        let header = Self {
            key_encoding: KeyEncoding::from_u8(tags[0])?,
            formats: ChannelFormats::new(
                Format::from_u8(tags[1])?,
                Format::from_u8(tags[2])?,
                Format::from_u8(tags[3])?,
            ),
            interpolation: Interpolation::from_u8(tags[4])?,
            byte_order: ByteOrder::from_u8(tags[5])?,
            scale_strip_size: tags[6],
            num_frames,
            sequence_length,
            num_tracks,
            byte_stream_len,
            scale_offset_count,
        };
        if header.scale_strip_size as usize != header.key_encoding.scale_strip_size() {
            return Err(CodecError::Malformed(format!(
                "scale strip size {} does not match {}",
                header.scale_strip_size, header.key_encoding
            )));
        }
        Ok(header)
    }
}
