//! RZX input recordings.
//!
//! A 10-byte header (`RZX!`, version, flags) followed by blocks, each
//! starting with a one-byte id and a 32-bit length that includes the
//! five header bytes. The blocks that matter for replay are snapshots
//! (`0x30`) and input recordings (`0x80`); the creator block (`0x10`) is
//! informational and anything else is carried through untouched.

use log::debug;

use crate::error::{Result, SimError};
use crate::snapshot::{self, SnapshotFormat};
use crate::zlib;

const MAGIC: &[u8; 4] = b"RZX!";
const HEADER_SIZE: usize = 10;

pub const CREATOR: u8 = 0x10;
pub const SECURITY_INFO: u8 = 0x20;
pub const SECURITY_SIGNATURE: u8 = 0x21;
pub const SNAPSHOT: u8 = 0x30;
pub const INPUT_RECORDING: u8 = 0x80;

const FLAG_EXTERNAL: u32 = 0x01;
const FLAG_COMPRESSED: u32 = 0x02;
const FLAG_PROTECTED: u32 = 0x01;

/// IN counter value meaning "same readings as the previous frame".
const REPEAT_READINGS: u16 = 0xFFFF;

/// Frames per second of recorded time.
const FRAME_RATE: u64 = 50;

/// Program that wrote the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    pub name: String,
    pub major: u16,
    pub minor: u16,
}

/// A snapshot block. `data` is the decompressed snapshot, or the
/// external-file descriptor when `external` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotBlock {
    pub external: bool,
    pub compressed: bool,
    pub extension: String,
    pub data: Vec<u8>,
}

impl SnapshotBlock {
    /// File name of an external snapshot.
    #[must_use]
    pub fn external_name(&self) -> String {
        let name = self.data.get(4..).unwrap_or_default();
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        String::from_utf8_lossy(&name[..end]).into_owned()
    }
}

/// One frame of recorded input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Opcode fetches (M1 cycles) executed in the frame.
    pub fetch_count: u16,
    /// Values returned by the frame's port reads, in order.
    pub readings: Vec<u8>,
    /// The file stored the readings as a repeat of the previous frame.
    pub repeated: bool,
}

impl Frame {
    #[must_use]
    pub fn new(fetch_count: u16, readings: Vec<u8>) -> Self {
        Self {
            fetch_count,
            readings,
            repeated: false,
        }
    }

    /// The IN counter as stored in the file.
    #[must_use]
    pub fn in_counter(&self) -> u16 {
        if self.repeated {
            REPEAT_READINGS
        } else {
            self.readings.len() as u16
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecording {
    /// CPU T-state counter at the start of the first frame.
    pub tstates: u32,
    pub protected: bool,
    pub compressed: bool,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockBody {
    Creator(Creator),
    Snapshot(SnapshotBlock),
    Input(InputRecording),
    Other,
}

/// A parsed block together with its bytes as they appear in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: u8,
    pub body: BlockBody,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RzxFile {
    pub major: u8,
    pub minor: u8,
    pub flags: u32,
    pub blocks: Vec<Block>,
}

fn dword(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn word(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn truncated(what: &str) -> SimError {
    SimError::invalid("RZX", format!("{what} truncated"))
}

fn parse_creator(raw: &[u8]) -> Result<Creator> {
    if raw.len() < 29 {
        return Err(truncated("creator block"));
    }
    let name = &raw[5..25];
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    Ok(Creator {
        name: String::from_utf8_lossy(&name[..end]).trim_end().to_string(),
        major: word(raw, 25),
        minor: word(raw, 27),
    })
}

fn parse_snapshot(raw: &[u8]) -> Result<SnapshotBlock> {
    if raw.len() < 17 {
        return Err(truncated("snapshot block"));
    }
    let flags = dword(raw, 5);
    let ext = &raw[9..13];
    let end = ext.iter().position(|&b| b == 0).unwrap_or(ext.len());
    let extension = String::from_utf8_lossy(&ext[..end]).to_ascii_lowercase();
    let compressed = flags & FLAG_COMPRESSED != 0;
    let data = if compressed {
        zlib::inflate(&raw[17..], "RZX")?
    } else {
        raw[17..].to_vec()
    };
    Ok(SnapshotBlock {
        external: flags & FLAG_EXTERNAL != 0,
        compressed,
        extension,
        data,
    })
}

fn parse_input(raw: &[u8]) -> Result<InputRecording> {
    if raw.len() < 18 {
        return Err(truncated("input recording block"));
    }
    let count = dword(raw, 5) as usize;
    let tstates = dword(raw, 10);
    let flags = dword(raw, 14);
    let compressed = flags & FLAG_COMPRESSED != 0;
    let data = if compressed {
        zlib::inflate(&raw[18..], "RZX")?
    } else {
        raw[18..].to_vec()
    };

    let mut frames: Vec<Frame> = Vec::with_capacity(count.min(data.len() / 4));
    let mut pos = 0;
    for _ in 0..count {
        let header = data.get(pos..pos + 4).ok_or_else(|| truncated("frame"))?;
        let fetch_count = word(header, 0);
        let in_counter = word(header, 2);
        pos += 4;
        let frame = if in_counter == REPEAT_READINGS {
            Frame {
                fetch_count,
                readings: frames.last().map(|f| f.readings.clone()).unwrap_or_default(),
                repeated: true,
            }
        } else {
            let n = usize::from(in_counter);
            let readings = data.get(pos..pos + n).ok_or_else(|| truncated("frame"))?;
            pos += n;
            Frame::new(fetch_count, readings.to_vec())
        };
        frames.push(frame);
    }
    Ok(InputRecording {
        tstates,
        protected: flags & FLAG_PROTECTED != 0,
        compressed,
        frames,
    })
}

impl RzxFile {
    /// Parse an RZX file.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE || &data[..4] != MAGIC {
            return Err(SimError::NotRzx);
        }
        let mut blocks = Vec::new();
        let mut pos = HEADER_SIZE;
        while pos < data.len() {
            let header = data.get(pos..pos + 5).ok_or_else(|| truncated("block header"))?;
            let id = header[0];
            let len = dword(header, 1) as usize;
            if len < 5 {
                return Err(SimError::invalid("RZX", format!("block 0x{id:02X} has length {len}")));
            }
            let raw = data.get(pos..pos + len).ok_or_else(|| truncated("block"))?;
            pos += len;
            debug!("RZX block 0x{id:02X} ({len} bytes)");
            let body = match id {
                CREATOR => BlockBody::Creator(parse_creator(raw)?),
                SNAPSHOT => BlockBody::Snapshot(parse_snapshot(raw)?),
                INPUT_RECORDING => BlockBody::Input(parse_input(raw)?),
                _ => BlockBody::Other,
            };
            blocks.push(Block {
                id,
                body,
                raw: raw.to_vec(),
            });
        }
        Ok(Self {
            major: data[4],
            minor: data[5],
            flags: dword(data, 6),
            blocks,
        })
    }
}

fn push_block(out: &mut Vec<u8>, id: u8, body: &[u8]) {
    out.push(id);
    out.extend_from_slice(&(body.len() as u32 + 5).to_le_bytes());
    out.extend_from_slice(body);
}

/// Write an RZX file: a creator block, a compressed snapshot, a compressed
/// input recording of `frames` starting at T-state 0, then `tail` verbatim.
pub fn write_rzx(
    snapshot: &[u8],
    format: SnapshotFormat,
    frames: &[Frame],
    tail: &[Block],
) -> Result<Vec<u8>> {
    let mut out = MAGIC.to_vec();
    out.extend_from_slice(&[0, 13, 0, 0, 0, 0]);

    let mut creator = [0u8; 24];
    let name = env!("CARGO_PKG_NAME").as_bytes();
    let len = name.len().min(20);
    creator[..len].copy_from_slice(&name[..len]);
    creator[20..22].copy_from_slice(&parse_version(env!("CARGO_PKG_VERSION_MAJOR")).to_le_bytes());
    creator[22..24].copy_from_slice(&parse_version(env!("CARGO_PKG_VERSION_MINOR")).to_le_bytes());
    push_block(&mut out, CREATOR, &creator);

    let mut body = FLAG_COMPRESSED.to_le_bytes().to_vec();
    let mut ext = [0u8; 4];
    ext[..3].copy_from_slice(format.extension().as_bytes());
    body.extend_from_slice(&ext);
    body.extend_from_slice(&(snapshot.len() as u32).to_le_bytes());
    body.extend_from_slice(&zlib::deflate(snapshot)?);
    push_block(&mut out, SNAPSHOT, &body);

    let mut frame_data = Vec::new();
    for frame in frames {
        frame_data.extend_from_slice(&frame.fetch_count.to_le_bytes());
        frame_data.extend_from_slice(&(frame.readings.len() as u16).to_le_bytes());
        frame_data.extend_from_slice(&frame.readings);
    }
    let mut body = (frames.len() as u32).to_le_bytes().to_vec();
    body.push(0);
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&FLAG_COMPRESSED.to_le_bytes());
    body.extend_from_slice(&zlib::deflate(&frame_data)?);
    push_block(&mut out, INPUT_RECORDING, &body);

    for block in tail {
        out.extend_from_slice(&block.raw);
    }
    Ok(out)
}

fn parse_version(text: &str) -> u16 {
    text.parse().unwrap_or(0)
}

/// Recorded time as `HhMMmSSs`.
fn duration(frames: usize) -> String {
    let secs = frames as u64 / FRAME_RATE;
    format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn describe_snapshot(block: &SnapshotBlock, lines: &mut Vec<String>) {
    lines.push("Snapshot:".to_string());
    lines.push(format!("  Filename extension: {}", block.extension));
    lines.push(format!("  Size: {} bytes", block.data.len()));
    if block.external {
        lines.push(format!("  External snapshot: {}", block.external_name()));
        return;
    }
    let decoded = SnapshotFormat::from_extension(&block.extension)
        .and_then(|format| snapshot::decode(format, &block.data).ok());
    match decoded {
        Some(snapshot) => {
            lines.push(format!("  Machine: {}", snapshot.machine));
            lines.push(format!("  Start address: {}", snapshot.registers.pc));
        }
        None => {
            lines.push("  Machine: Unknown".to_string());
            lines.push("  Start address: Unknown".to_string());
        }
    }
}

fn describe_input(input: &InputRecording, show_frames: bool, lines: &mut Vec<String>) {
    lines.push("Input recording".to_string());
    lines.push(format!(
        "  Number of frames: {} ({})",
        input.frames.len(),
        duration(input.frames.len())
    ));
    lines.push(format!("  T-states: {}", input.tstates));
    lines.push(format!("  Encrypted: {}", if input.protected { "Yes" } else { "No" }));
    if !show_frames {
        return;
    }
    for (i, frame) in input.frames.iter().enumerate() {
        lines.push(format!("  Frame {i}:"));
        lines.push(format!("    Fetch counter: {}", frame.fetch_count));
        lines.push(format!("    IN counter: {}", frame.in_counter()));
        if !frame.readings.is_empty() {
            let shown: Vec<String> = frame.readings.iter().take(10).map(u8::to_string).collect();
            let more = if frame.readings.len() > 10 { "..." } else { "" };
            lines.push(format!("    Port readings: {}{more}", shown.join(", ")));
        }
    }
}

/// Human-readable summary of every block, one line per entry.
#[must_use]
pub fn info_lines(rzx: &RzxFile, show_frames: bool) -> Vec<String> {
    let mut lines = vec![
        format!("Version: {}.{}", rzx.major, rzx.minor),
        format!("Signed: {}", if rzx.flags & 1 != 0 { "Yes" } else { "No" }),
    ];
    for block in &rzx.blocks {
        match &block.body {
            BlockBody::Creator(creator) => {
                lines.push("Creator information:".to_string());
                lines.push(format!(
                    "  ID: {} {}.{} ({}.{}.{}.{})",
                    creator.name,
                    creator.major,
                    creator.minor,
                    creator.major >> 8,
                    creator.major & 0xFF,
                    creator.minor >> 8,
                    creator.minor & 0xFF
                ));
            }
            BlockBody::Snapshot(snapshot) => describe_snapshot(snapshot, &mut lines),
            BlockBody::Input(input) => describe_input(input, show_frames, &mut lines),
            BlockBody::Other => lines.push(match block.id {
                SECURITY_INFO => "Security information".to_string(),
                SECURITY_SIGNATURE => "Security signature".to_string(),
                id => format!("Unknown block ID: 0x{id:02X}"),
            }),
        }
    }
    lines
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds RZX files block by block for tests.
    #[derive(Default)]
    pub(crate) struct RzxBuilder {
        data: Vec<u8>,
    }

    impl RzxBuilder {
        pub(crate) fn new() -> Self {
            let mut data = MAGIC.to_vec();
            data.extend_from_slice(&[0, 13, 0, 0, 0, 0]);
            Self { data }
        }

        pub(crate) fn creator(mut self, name: &str, major: u16, minor: u16) -> Self {
            let mut body = [0u8; 24];
            body[..name.len()].copy_from_slice(name.as_bytes());
            body[20..22].copy_from_slice(&major.to_le_bytes());
            body[22..24].copy_from_slice(&minor.to_le_bytes());
            push_block(&mut self.data, CREATOR, &body);
            self
        }

        pub(crate) fn snapshot(mut self, ext: &str, data: &[u8], flags: u32) -> Self {
            let mut body = flags.to_le_bytes().to_vec();
            let mut e = [0u8; 4];
            e[..ext.len()].copy_from_slice(ext.as_bytes());
            body.extend_from_slice(&e);
            body.extend_from_slice(&(data.len() as u32).to_le_bytes());
            if flags & FLAG_COMPRESSED != 0 {
                body.extend_from_slice(&zlib::deflate(data).expect("deflate"));
            } else {
                body.extend_from_slice(data);
            }
            push_block(&mut self.data, SNAPSHOT, &body);
            self
        }

        /// Frames as (fetch count, IN counter, readings).
        pub(crate) fn input(mut self, tstates: u32, frames: &[(u16, u16, &[u8])]) -> Self {
            let mut body = (frames.len() as u32).to_le_bytes().to_vec();
            body.push(0);
            body.extend_from_slice(&tstates.to_le_bytes());
            body.extend_from_slice(&0u32.to_le_bytes());
            for (fetch, count, readings) in frames {
                body.extend_from_slice(&fetch.to_le_bytes());
                body.extend_from_slice(&count.to_le_bytes());
                body.extend_from_slice(readings);
            }
            push_block(&mut self.data, INPUT_RECORDING, &body);
            self
        }

        pub(crate) fn raw(mut self, id: u8, body: &[u8]) -> Self {
            push_block(&mut self.data, id, body);
            self
        }

        pub(crate) fn build(self) -> Vec<u8> {
            self.data
        }
    }

    fn sna48() -> Vec<u8> {
        vec![0; 49_179]
    }

    #[test]
    fn not_rzx() {
        assert!(matches!(RzxFile::parse(b"RZX!"), Err(SimError::NotRzx)));
        assert!(matches!(RzxFile::parse(b"This is not an RZX file"), Err(SimError::NotRzx)));
    }

    #[test]
    fn repeated_readings_copy_previous_frame() {
        let data = RzxBuilder::new()
            .input(100, &[(1, 2, &[3, 4]), (20, 65535, &[])])
            .build();
        let rzx = RzxFile::parse(&data).unwrap();
        let BlockBody::Input(input) = &rzx.blocks[0].body else {
            panic!("expected input recording");
        };
        assert_eq!(input.tstates, 100);
        assert_eq!(input.frames[1].readings, [3, 4]);
        assert!(input.frames[1].repeated);
        assert_eq!(input.frames[1].in_counter(), 65535);
    }

    #[test]
    fn truncated_frame_is_invalid() {
        let mut data = RzxBuilder::new().input(0, &[(1, 3, &[1, 2, 3])]).build();
        // Shrink the block's declared length along with the data.
        data.pop();
        data[11] -= 1;
        let err = RzxFile::parse(&data).unwrap_err();
        assert_eq!(err.to_string(), "Invalid RZX file: frame truncated");
    }

    #[test]
    fn huge_frame_count_without_frames_is_invalid() {
        let mut data = RzxBuilder::new().input(0, &[]).build();
        data[15..19].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        let err = RzxFile::parse(&data).unwrap_err();
        assert_eq!(err.to_string(), "Invalid RZX file: frame truncated");
    }

    #[test]
    fn info_for_48k_sna() {
        let data = RzxBuilder::new()
            .creator("SkoolKit", 9, 2)
            .snapshot("sna", &sna48(), 0)
            .input(0, &[(1, 0, &[])])
            .build();
        let lines = info_lines(&RzxFile::parse(&data).unwrap(), false);
        assert_eq!(
            lines,
            [
                "Version: 0.13",
                "Signed: No",
                "Creator information:",
                "  ID: SkoolKit 9.2 (0.9.0.2)",
                "Snapshot:",
                "  Filename extension: sna",
                "  Size: 49179 bytes",
                "  Machine: 48K Spectrum",
                "  Start address: 0",
                "Input recording",
                "  Number of frames: 1 (0h00m00s)",
                "  T-states: 0",
                "  Encrypted: No",
            ]
        );
    }

    #[test]
    fn info_canonical_creator_version() {
        let data = RzxBuilder::new().creator("Fuse", 261, 1792).build();
        let lines = info_lines(&RzxFile::parse(&data).unwrap(), false);
        assert_eq!(lines[3], "  ID: Fuse 261.1792 (1.5.7.0)");
    }

    #[test]
    fn info_external_and_unknown_snapshots() {
        let mut descriptor = vec![0; 4];
        descriptor.extend_from_slice(b"game.sna\0");
        let data = RzxBuilder::new()
            .snapshot("sna", &descriptor, FLAG_EXTERNAL)
            .snapshot("ust", &[0; 10], 0)
            .build();
        let lines = info_lines(&RzxFile::parse(&data).unwrap(), false);
        assert_eq!(
            lines[2..],
            [
                "Snapshot:",
                "  Filename extension: sna",
                "  Size: 13 bytes",
                "  External snapshot: game.sna",
                "Snapshot:",
                "  Filename extension: ust",
                "  Size: 10 bytes",
                "  Machine: Unknown",
                "  Start address: Unknown",
            ]
        );
    }

    #[test]
    fn info_security_and_unknown_blocks() {
        let data = RzxBuilder::new()
            .raw(SECURITY_INFO, &[0; 8])
            .raw(SECURITY_SIGNATURE, &[1, 2])
            .raw(0xFF, &[3, 4])
            .build();
        let lines = info_lines(&RzxFile::parse(&data).unwrap(), false);
        assert_eq!(
            lines[2..],
            ["Security information", "Security signature", "Unknown block ID: 0xFF"]
        );
    }

    #[test]
    fn info_frames() {
        let fives = [5u8; 11];
        let data = RzxBuilder::new()
            .snapshot("sna", &sna48(), FLAG_COMPRESSED)
            .input(0, &[(1, 2, &[3, 4]), (10, 11, &fives), (20, 65535, &[])])
            .build();
        let lines = info_lines(&RzxFile::parse(&data).unwrap(), true);
        assert_eq!(
            lines[7..],
            [
                "Input recording",
                "  Number of frames: 3 (0h00m00s)",
                "  T-states: 0",
                "  Encrypted: No",
                "  Frame 0:",
                "    Fetch counter: 1",
                "    IN counter: 2",
                "    Port readings: 3, 4",
                "  Frame 1:",
                "    Fetch counter: 10",
                "    IN counter: 11",
                "    Port readings: 5, 5, 5, 5, 5, 5, 5, 5, 5, 5...",
                "  Frame 2:",
                "    Fetch counter: 20",
                "    IN counter: 65535",
                "    Port readings: 5, 5, 5, 5, 5, 5, 5, 5, 5, 5...",
            ]
        );
    }

    #[test]
    fn duration_format() {
        assert_eq!(duration(1), "0h00m00s");
        assert_eq!(duration(50 * 3725), "1h02m05s");
    }

    #[test]
    fn written_file_parses_back() {
        let frames = vec![Frame::new(5, vec![0xBF]), Frame::new(7, vec![])];
        let tail = RzxFile::parse(&RzxBuilder::new().raw(SECURITY_INFO, &[9; 3]).build())
            .unwrap()
            .blocks;
        let data = write_rzx(&sna48(), SnapshotFormat::Sna, &frames, &tail).unwrap();
        let rzx = RzxFile::parse(&data).unwrap();
        assert_eq!(rzx.blocks.len(), 4);
        assert_eq!(rzx.blocks[0].raw.len(), 29);
        let BlockBody::Snapshot(snapshot) = &rzx.blocks[1].body else {
            panic!("expected snapshot");
        };
        assert!(snapshot.compressed);
        assert_eq!(snapshot.extension, "sna");
        assert_eq!(snapshot.data, sna48());
        let BlockBody::Input(input) = &rzx.blocks[2].body else {
            panic!("expected input recording");
        };
        assert_eq!(input.tstates, 0);
        assert_eq!(input.frames, frames);
        assert_eq!(rzx.blocks[3].id, SECURITY_INFO);
    }
}
