//! A single `.vxr` region file: header table + sector-aligned body
//! (spec.md §6.1). Grounded on
//! `original_source/streams/voxel_stream_region_files.cpp`'s
//! `CachedRegion`/`RegionHeader`/`BlockInfo` trio.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use glam::IVec3;

use crate::constants::region::{FORMAT_VERSION, MAGIC};
use crate::error::{EngineError, EngineResult};
use crate::region::RegionError;
use crate::voxel::{ChannelId, Compression, VoxelBuffer};

const HEADER_PREAMBLE: u64 = 5; // 4-byte magic + 1-byte version

/// Upper 24 bits: sector index into the body. Lower 8 bits: sector count
/// (0 if the slot is empty).
#[derive(Debug, Clone, Copy, Default)]
struct BlockInfo(u32);

impl BlockInfo {
    fn sector_index(self) -> u32 {
        self.0 >> 8
    }
    fn sector_count(self) -> u32 {
        self.0 & 0xFF
    }
    fn pack(sector_index: u32, sector_count: u32) -> Self {
        debug_assert!(sector_index <= 0xFF_FFFF);
        debug_assert!(sector_count <= 0xFF);
        Self((sector_index << 8) | (sector_count & 0xFF))
    }
    fn is_empty(self) -> bool {
        self.0 == 0
    }
}

pub struct RegionFile {
    file: File,
    region_size: u32,
    sector_size: u32,
    header: Vec<BlockInfo>,
    /// Which header slot (flat index) owns each sector in the body, in
    /// file order. Mirrors the teacher's `CachedRegion::sectors` reverse
    /// table.
    sector_owner: Vec<Option<usize>>,
}

impl RegionFile {
    fn header_len(region_size: u32) -> usize {
        (region_size as usize).pow(3)
    }

    fn body_offset(&self) -> u64 {
        HEADER_PREAMBLE + self.header.len() as u64 * 4
    }

    pub fn open_or_create(path: &Path, region_size: u32, sector_size: u32) -> EngineResult<Self> {
        let header_len = Self::header_len(region_size);
        if path.exists() {
            let mut file = OpenOptions::new().read(true).write(true).open(path)?;
            let mut preamble = [0u8; 5];
            file.read_exact(&mut preamble)?;
            if preamble[0..4] != MAGIC {
                return Err(RegionError::BadMagic {
                    path: path.display().to_string(),
                }
                .into());
            }
            if preamble[4] != FORMAT_VERSION {
                return Err(RegionError::UnsupportedVersion {
                    version: preamble[4],
                    path: path.display().to_string(),
                }
                .into());
            }
            let mut header_bytes = vec![0u8; header_len * 4];
            file.read_exact(&mut header_bytes)?;
            let header: Vec<BlockInfo> = header_bytes
                .chunks_exact(4)
                .map(|c| BlockInfo(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
                .collect();

            let body_offset = HEADER_PREAMBLE + header.len() as u64 * 4;
            let file_len = file.metadata()?.len();
            let body_sectors = if file_len > body_offset {
                ((file_len - body_offset) / sector_size as u64) as usize
            } else {
                0
            };
            let mut sector_owner = vec![None; body_sectors];
            for (flat_idx, info) in header.iter().enumerate() {
                if info.is_empty() {
                    continue;
                }
                let start = info.sector_index() as usize;
                let count = info.sector_count() as usize;
                for s in start..(start + count).min(sector_owner.len()) {
                    sector_owner[s] = Some(flat_idx);
                }
            }

            Ok(Self {
                file,
                region_size,
                sector_size,
                header,
                sector_owner,
            })
        } else {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            file.write_all(&MAGIC)?;
            file.write_all(&[FORMAT_VERSION])?;
            file.write_all(&vec![0u8; header_len * 4])?;
            file.flush()?;
            Ok(Self {
                file,
                region_size,
                sector_size,
                header: vec![BlockInfo::default(); header_len],
                sector_owner: Vec::new(),
            })
        }
    }

    fn flat_index(&self, rpos: IVec3) -> usize {
        (rpos.z as usize * self.region_size as usize + rpos.y as usize) * self.region_size as usize
            + rpos.x as usize
    }

    fn persist_header(&mut self) -> EngineResult<()> {
        let mut bytes = Vec::with_capacity(self.header.len() * 4);
        for info in &self.header {
            bytes.extend_from_slice(&info.0.to_le_bytes());
        }
        self.file.seek(SeekFrom::Start(HEADER_PREAMBLE))?;
        self.file.write_all(&bytes)?;
        Ok(())
    }

    fn sectors_for(&self, byte_len: usize) -> u32 {
        ((byte_len + self.sector_size as usize - 1) / self.sector_size as usize) as u32
    }

    /// Shift every sector after `[start, start+count)` down by `count`
    /// sectors, physically rewriting the body tail, and adjust every
    /// affected header entry (spec.md §6.1 "the old span is reclaimed by
    /// shifting following sectors down").
    fn reclaim_span(&mut self, start: usize, count: usize) -> EngineResult<()> {
        let body_offset = self.body_offset();
        let tail_start_sector = start + count;
        if tail_start_sector < self.sector_owner.len() {
            let tail_sectors = self.sector_owner.len() - tail_start_sector;
            let tail_bytes = tail_sectors * self.sector_size as usize;
            let mut buf = vec![0u8; tail_bytes];
            self.file.seek(SeekFrom::Start(
                body_offset + tail_start_sector as u64 * self.sector_size as u64,
            ))?;
            self.file.read_exact(&mut buf)?;
            self.file.seek(SeekFrom::Start(
                body_offset + start as u64 * self.sector_size as u64,
            ))?;
            self.file.write_all(&buf)?;
        }

        for info in &mut self.header {
            if info.is_empty() {
                continue;
            }
            if info.sector_index() as usize >= tail_start_sector {
                *info = BlockInfo::pack(info.sector_index() - count as u32, info.sector_count());
            }
        }

        let new_len = self.sector_owner.len() - count;
        self.sector_owner.drain(start..start + count);
        debug_assert_eq!(self.sector_owner.len(), new_len);
        for (i, owner) in self.sector_owner.iter().enumerate().skip(start) {
            if let Some(flat_idx) = owner {
                let info = self.header[*flat_idx];
                debug_assert!(i as u32 >= info.sector_index());
            }
        }

        self.file
            .set_len(body_offset + self.sector_owner.len() as u64 * self.sector_size as u64)?;
        Ok(())
    }

    pub fn read_block(&mut self, rpos: IVec3) -> EngineResult<Option<Vec<u8>>> {
        let flat_idx = self.flat_index(rpos);
        let info = self.header[flat_idx];
        if info.is_empty() {
            return Ok(None);
        }
        let body_offset = self.body_offset();
        self.file.seek(SeekFrom::Start(
            body_offset + info.sector_index() as u64 * self.sector_size as u64,
        ))?;
        let mut len_bytes = [0u8; 4];
        self.file.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let mut record = vec![0u8; len];
        self.file.read_exact(&mut record)?;
        Ok(Some(Self::parse_record(&record)?))
    }

    pub fn write_block(&mut self, rpos: IVec3, payload: &[u8]) -> EngineResult<()> {
        let record = Self::build_record(payload);
        let flat_idx = self.flat_index(rpos);
        let total_len = 4 + record.len();
        let sectors_needed = self.sectors_for(total_len);

        let existing = self.header[flat_idx];
        if !existing.is_empty() {
            if existing.sector_count() >= sectors_needed {
                self.write_at_sector(existing.sector_index(), &record)?;
                return Ok(());
            }
            self.reclaim_span(existing.sector_index() as usize, existing.sector_count() as usize)?;
            self.header[flat_idx] = BlockInfo::default();
        }

        let new_index = self.sector_owner.len() as u32;
        self.write_at_sector(new_index, &record)?;
        self.sector_owner
            .extend(std::iter::repeat(Some(flat_idx)).take(sectors_needed as usize));
        self.header[flat_idx] = BlockInfo::pack(new_index, sectors_needed);
        self.persist_header()?;
        Ok(())
    }

    /// Wraps a logical block payload into its on-disk record: a
    /// compression flag byte, the (optionally LZ4-compressed) body, and a
    /// trailing CRC32 of that body. The region format itself is silent on
    /// checksums and compression, so both are additions layered on top of
    /// the stored length prefix rather than changes to it.
    fn build_record(payload: &[u8]) -> Vec<u8> {
        #[cfg(feature = "native")]
        let (flag, body): (u8, Vec<u8>) = (1, lz4_flex::compress_prepend_size(payload));
        #[cfg(not(feature = "native"))]
        let (flag, body): (u8, Vec<u8>) = (0, payload.to_vec());

        let checksum = crc32fast::hash(&body);
        let mut record = Vec::with_capacity(1 + body.len() + 4);
        record.push(flag);
        record.extend_from_slice(&body);
        record.extend_from_slice(&checksum.to_le_bytes());
        record
    }

    fn parse_record(record: &[u8]) -> EngineResult<Vec<u8>> {
        if record.len() < 5 {
            return Err(EngineError::InvalidFormat {
                reason: "block record too short to hold a checksum".to_string(),
            });
        }
        let flag = record[0];
        let body = &record[1..record.len() - 4];
        let expected = u32::from_le_bytes(record[record.len() - 4..].try_into().unwrap());
        let actual = crc32fast::hash(body);
        if actual != expected {
            return Err(RegionError::CorruptChecksum { expected, actual }.into());
        }
        match flag {
            0 => Ok(body.to_vec()),
            1 => {
                #[cfg(feature = "native")]
                {
                    lz4_flex::decompress_size_prepended(body).map_err(|e| {
                        RegionError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
                            .into()
                    })
                }
                #[cfg(not(feature = "native"))]
                {
                    Err(EngineError::InvalidFormat {
                        reason: "block record is LZ4-compressed but the native feature is disabled"
                            .to_string(),
                    })
                }
            }
            other => Err(EngineError::InvalidFormat {
                reason: format!("unknown block record flag {}", other),
            }),
        }
    }

    fn write_at_sector(&mut self, sector_index: u32, payload: &[u8]) -> EngineResult<()> {
        let body_offset = self.body_offset();
        let sectors_needed = self.sectors_for(4 + payload.len());
        let padded_len = sectors_needed as usize * self.sector_size as usize;
        let mut buf = vec![0u8; padded_len];
        buf[0..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        buf[4..4 + payload.len()].copy_from_slice(payload);
        self.file.seek(SeekFrom::Start(
            body_offset + sector_index as u64 * self.sector_size as u64,
        ))?;
        self.file.write_all(&buf)?;
        Ok(())
    }
}

/// Fixed per-channel order for on-disk payloads (spec.md §6.1: "Channel
/// count and order are fixed by protocol, not stored per block").
const CHANNEL_ORDER: [ChannelId; 7] = ChannelId::ALL;

pub fn encode_block_payload(buffer: &VoxelBuffer) -> Vec<u8> {
    let mut out = Vec::new();
    for channel in CHANNEL_ORDER {
        match buffer.channel_compression(channel) {
            Compression::Uniform => {
                out.push(1);
                let depth = buffer.get_channel_depth(channel);
                let value = buffer.uniform_raw(channel);
                out.extend_from_slice(&value.to_le_bytes()[..depth.bytes()]);
            }
            Compression::Raw => {
                out.push(0);
                out.extend_from_slice(buffer.raw_bytes(channel).expect("raw compression"));
            }
        }
    }
    out
}

pub fn decode_block_payload(bytes: &[u8], out: &mut VoxelBuffer) -> EngineResult<()> {
    let mut cursor = 0usize;
    let size = out.size() as usize;
    for channel in CHANNEL_ORDER {
        let depth = out.get_channel_depth(channel);
        if cursor >= bytes.len() {
            return Err(EngineError::InvalidFormat {
                reason: "block payload truncated".to_string(),
            });
        }
        let tag = bytes[cursor];
        cursor += 1;
        match tag {
            1 => {
                let stride = depth.bytes();
                let mut buf = [0u8; 8];
                buf[..stride].copy_from_slice(&bytes[cursor..cursor + stride]);
                cursor += stride;
                out.load_uniform_channel(channel, u64::from_le_bytes(buf));
            }
            0 => {
                let len = size.pow(3) * depth.bytes();
                let slice = bytes[cursor..cursor + len].to_vec();
                cursor += len;
                out.load_raw_channel(channel, slice)?;
            }
            other => {
                return Err(EngineError::InvalidFormat {
                    reason: format!("unknown compression tag {}", other),
                })
            }
        }
    }
    Ok(())
}
