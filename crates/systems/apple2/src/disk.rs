//! Disk II controller: stepper-motor head positioning, the DOS 3.3 6-and-2
//! nibble codec, the encoded track buffer, and the sector write state
//! machine.
//!
//! The controller keeps the loaded image in logical sector order and
//! regenerates the encoded track buffer whenever the head lands on a track.
//! Odd half-track positions read as zeroes, like a real head sitting
//! between tracks.

use emu_core::log;
use emu_core::logging::{LogCategory, LogLevel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TRACKS_PER_DISK: usize = 35;
pub const SECTORS_PER_TRACK: usize = 16;
pub const SECTOR_BYTES: usize = 0x100;
pub const IMAGE_LENGTH: usize = TRACKS_PER_DISK * SECTORS_PER_TRACK * SECTOR_BYTES;

// Each sector has
// Address field prologue               0x003 bytes
// Volume, Track, Sector, Checksum      0x008 bytes
// Address field epilogue               0x003 bytes
// Data prologue                        0x003 bytes
// 2-bits                               0x056 bytes
// 6-bits                               0x100 bytes
// checksum                             0x001 byte
// Data epilogue                        0x003 bytes
pub const DISK_SECTOR_BYTES: usize = 3 + 8 + 3 + 3 + 0x56 + 0x100 + 1 + 3;
pub const TRACK_DATA_BYTES: usize = SECTORS_PER_TRACK * DISK_SECTOR_BYTES;

const ENCODED_SECTOR_BYTES: usize = 0x56 + 0x100;
const PROLOGUE_SEARCH_LIMIT: usize = 16;

/// Volume numbers aren't implemented; every address field carries this one.
const VOLUME_NUMBER: u8 = 254;

/// Physical sector order on the track -> logical sector inside the image.
pub const DOS33_SECTOR_INTERLEAVE: [u8; 16] = [
    0x0, 0x7, 0xe, 0x6, 0xd, 0x5, 0xc, 0x4, 0xb, 0x3, 0xa, 0x2, 0x9, 0x1, 0x8, 0xf,
];

/// Conversion of a 6 bit byte to an 8 bit "disk" byte.
const SIX_TWO_ENCODE: [u8; 0x40] = [
    0x96, 0x97, 0x9a, 0x9b, 0x9d, 0x9e, 0x9f, 0xa6, 0xa7, 0xab, 0xac, 0xad, 0xae, 0xaf, 0xb2,
    0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb9, 0xba, 0xbb, 0xbc, 0xbd, 0xbe, 0xbf, 0xcb, 0xcd, 0xce,
    0xcf, 0xd3, 0xd6, 0xd7, 0xd9, 0xda, 0xdb, 0xdc, 0xdd, 0xde, 0xdf, 0xe5, 0xe6, 0xe7, 0xe9,
    0xea, 0xeb, 0xec, 0xed, 0xee, 0xef, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf9, 0xfa, 0xfb,
    0xfc, 0xfd, 0xfe, 0xff,
];

/// Inverse of `SIX_TWO_ENCODE`.
const SIX_TWO_DECODE: [u8; 0x100] = build_six_two_decode();

const fn build_six_two_decode() -> [u8; 0x100] {
    let mut table = [0u8; 0x100];
    let mut i = 0;
    while i < 0x40 {
        table[SIX_TWO_ENCODE[i] as usize] = i as u8;
        i += 1;
    }
    table
}

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("Disk image has invalid length {actual}, expected {expected}")]
    InvalidImageLength { actual: usize, expected: usize },
}

/// Mechanical state of the selected drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DriveState {
    /// Currently selected drive (1 or 2)
    pub drive: u8,
    pub spinning: bool,
    /// Head position in half-tracks (0..=79)
    pub phase: i8,
    /// 4-bit mask of energized stepper magnets
    pub phases: u8,
    /// Cursor inside the encoded track buffer
    pub byte_position: usize,
    pub q6: bool,
    pub q7: bool,
}

impl Default for DriveState {
    fn default() -> Self {
        Self {
            drive: 1,
            spinning: false,
            phase: 0,
            phases: 0,
            byte_position: 0,
            q6: false,
            q7: false,
        }
    }
}

/// Volume/track/sector triple recovered from an address field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressField {
    pub volume: u8,
    pub track: u8,
    pub sector: u8,
}

/// The sector write path. Writes arrive one byte at a time on $C0ED; the
/// state machine hunts for the data prologue, then accumulates the encoded
/// sector body.
#[derive(Debug)]
enum SectorWriteState {
    WaitingForDataPrologue {
        buf: [u8; PROLOGUE_SEARCH_LIMIT],
        len: usize,
    },
    ReceivingData {
        address: AddressField,
        data: [u8; ENCODED_SECTOR_BYTES],
        len: usize,
    },
}

impl Default for SectorWriteState {
    fn default() -> Self {
        SectorWriteState::WaitingForDataPrologue {
            buf: [0; PROLOGUE_SEARCH_LIMIT],
            len: 0,
        }
    }
}

/// Encode a byte into two 4-bit bytes with odd-even encoding. This is used
/// for the sector address headers.
fn odd_even_encode(data: u8) -> (u8, u8) {
    let l = 0xaa | ((data >> 1) & 0x55);
    let h = 0xaa | (data & 0x55);
    (l, h)
}

/// Merge the two bytes produced by `odd_even_encode`.
fn odd_even_decode(data0: u8, data1: u8) -> u8 {
    ((data0 << 1) | 1) & data1
}

fn decode_address_field(data: &[u8]) -> AddressField {
    AddressField {
        volume: odd_even_decode(data[0], data[1]),
        track: odd_even_decode(data[2], data[3]),
        sector: odd_even_decode(data[4], data[5]),
    }
}

/// Convert 256 raw bytes to 0x56 2-bit bytes followed by 0x100 6-bit bytes.
fn encode_sector_data(sector: &[u8]) -> [u8; ENCODED_SECTOR_BYTES] {
    let mut data = [0u8; ENCODED_SECTOR_BYTES];

    let mut two_bit_pos = 0;
    for i in 0..SECTOR_BYTES {
        let b = sector[i];
        let bit0 = b & 0x1;
        let bit1 = (b & 0x2) >> 1;
        data[two_bit_pos] = (data[two_bit_pos] >> 2) | (bit0 << 5) | (bit1 << 4);
        data[i + 0x56] = b >> 2;

        two_bit_pos += 1;
        if two_bit_pos == 0x56 {
            two_bit_pos = 0;
        }
    }

    // The two remainders of the 256/3 split only get shifted twice; move
    // their bits into place.
    data[0x54] >>= 2;
    data[0x55] >>= 2;

    data
}

/// Inverse of `encode_sector_data`. Consumes the two-bit region in place.
fn decode_sector_data(data: &mut [u8; ENCODED_SECTOR_BYTES]) -> [u8; SECTOR_BYTES] {
    let mut sector = [0u8; SECTOR_BYTES];
    for i in 0..SECTOR_BYTES {
        sector[i] = data[i + 0x56];
    }

    let mut two_bit_pos = 0;
    for value in sector.iter_mut() {
        let two_bit = data[two_bit_pos];
        *value = (*value << 2) + ((two_bit & 1) << 1) + ((two_bit & 2) >> 1);
        data[two_bit_pos] >>= 2;

        two_bit_pos += 1;
        if two_bit_pos == 0x56 {
            two_bit_pos = 0;
        }
    }

    sector
}

/// Disk II controller for the slot-6 drive.
#[derive(Debug)]
pub struct DiskController {
    /// Loaded disk image in logical sector order
    image: Vec<u8>,
    mounted: bool,
    dirty: bool,
    /// Encoded image data as returned by the controller for a single track
    track_data: Vec<u8>,
    pub drive: DriveState,
    last_read_address: AddressField,
    last_read_sector_data_position: usize,
    write_state: SectorWriteState,
}

impl Default for DiskController {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskController {
    pub fn new() -> Self {
        Self {
            image: vec![0; IMAGE_LENGTH],
            mounted: false,
            dirty: false,
            track_data: vec![0; TRACK_DATA_BYTES],
            drive: DriveState::default(),
            last_read_address: AddressField::default(),
            last_read_sector_data_position: 0,
            write_state: SectorWriteState::default(),
        }
    }

    /// Load a 143,360-byte DOS 3.3 image (35 tracks x 16 sectors x 256
    /// bytes, logical order).
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<(), DiskError> {
        if bytes.len() != IMAGE_LENGTH {
            return Err(DiskError::InvalidImageLength {
                actual: bytes.len(),
                expected: IMAGE_LENGTH,
            });
        }
        self.image.copy_from_slice(bytes);
        self.mounted = true;
        self.dirty = false;
        self.write_state = SectorWriteState::default();
        self.make_track_data(self.drive.phase as u8);
        Ok(())
    }

    pub fn eject(&mut self) {
        self.image.fill(0);
        self.mounted = false;
        self.dirty = false;
        self.make_track_data(self.drive.phase as u8);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// True once a sector write has modified the image; the frontend
    /// flushes the image exactly once at shutdown.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.image
    }

    pub fn last_read_address(&self) -> AddressField {
        self.last_read_address
    }

    pub fn last_read_sector_data_position(&self) -> usize {
        self.last_read_sector_data_position
    }

    fn sector_offset(track: u8, logical_sector: u8) -> usize {
        (track as usize * SECTORS_PER_TRACK + logical_sector as usize) * SECTOR_BYTES
    }

    /// Turn a stepper magnet on or off. On a turn-on, a single energized
    /// neighbor pulls the head one half-track in that direction, clamped to
    /// the arm's travel. Returns true when the head moved.
    pub fn set_magnet(&mut self, magnet: u8, on: bool) -> bool {
        if !on {
            self.drive.phases &= !(1 << magnet);
            return false;
        }

        self.drive.phases |= 1 << magnet;

        // Move the head if a neighboring magnet is on and all others off
        let mut direction: i8 = 0;
        if self.drive.phases & (1 << ((self.drive.phase + 1) & 3)) != 0 {
            direction += 1;
        }
        if self.drive.phases & (1 << ((self.drive.phase + 3) & 3)) != 0 {
            direction -= 1;
        }
        if direction == 0 {
            return false;
        }

        self.drive.phase += direction;
        if self.drive.phase < 0 {
            self.drive.phase = 0;
        }
        if self.drive.phase == 80 {
            self.drive.phase = 79;
        }

        log!(
            LogCategory::Disk,
            LogLevel::Debug,
            "Disk: head moved to phase {}",
            self.drive.phase
        );
        self.make_track_data(self.drive.phase as u8);
        true
    }

    pub fn set_motor(&mut self, on: bool) {
        self.drive.spinning = on;
    }

    pub fn select_drive(&mut self, drive: u8) {
        self.drive.drive = drive;
    }

    /// Regenerate the encoded track buffer for the given arm position.
    /// Tracks exist on even positions; odd positions and positions past the
    /// last track read as zeroes.
    pub fn make_track_data(&mut self, arm_position: u8) {
        let track = arm_position / 2;

        if arm_position >= (TRACKS_PER_DISK * 2) as u8 || arm_position % 2 == 1 {
            self.track_data.fill(0);
            return;
        }

        // Point the head at the first sector
        self.drive.byte_position = 0;

        for physical_sector in 0..SECTORS_PER_TRACK as u8 {
            self.make_sector_data(track, physical_sector);
        }
    }

    /// Encode one physical sector of `track` into its slice of the track
    /// buffer.
    fn make_sector_data(&mut self, track: u8, physical_sector: u8) {
        let logical_sector = DOS33_SECTOR_INTERLEAVE[physical_sector as usize];
        let offset = physical_sector as usize * DISK_SECTOR_BYTES;
        let out = &mut self.track_data[offset..offset + DISK_SECTOR_BYTES];

        let checksum = VOLUME_NUMBER ^ track ^ physical_sector;
        let (vol_l, vol_h) = odd_even_encode(VOLUME_NUMBER);
        let (tr_l, tr_h) = odd_even_encode(track);
        let (se_l, se_h) = odd_even_encode(physical_sector);
        let (cs_l, cs_h) = odd_even_encode(checksum);

        // Address field prologue
        out[0] = 0xd5;
        out[1] = 0xaa;
        out[2] = 0x96;

        // Volume, track, sector and checksum
        out[3] = vol_l;
        out[4] = vol_h;
        out[5] = tr_l;
        out[6] = tr_h;
        out[7] = se_l;
        out[8] = se_h;
        out[9] = cs_l;
        out[10] = cs_h;

        // Address epilogue
        out[11] = 0xde;
        out[12] = 0xaa;
        out[13] = 0xeb;

        // Data field prologue
        out[14] = 0xd5;
        out[15] = 0xaa;
        out[16] = 0xad;

        let start = Self::sector_offset(track, logical_sector);
        let sector_data = encode_sector_data(&self.image[start..start + SECTOR_BYTES]);

        // a is the previous byte's value in the EOR chain
        let mut a = 0u8;
        for (i, &value) in sector_data.iter().enumerate() {
            a ^= value;
            out[17 + i] = SIX_TWO_ENCODE[a as usize];
            a = value;
        }

        // Checksum byte closes the chain
        out[17 + ENCODED_SECTOR_BYTES] = SIX_TWO_ENCODE[a as usize];

        // Data epilogue
        out[17 + ENCODED_SECTOR_BYTES + 1] = 0xde;
        out[17 + ENCODED_SECTOR_BYTES + 2] = 0xaa;
        out[17 + ENCODED_SECTOR_BYTES + 3] = 0xeb;
    }

    /// Read a byte from the disk head and spin the disk along. Passing an
    /// address prologue records the address field and where its data field
    /// starts.
    pub fn read_track_data(&mut self) -> u8 {
        let pos = self.drive.byte_position;
        let result = self.track_data[pos];

        if pos >= 9
            && self.track_data[pos - 9] == 0xd5
            && self.track_data[pos - 8] == 0xaa
            && self.track_data[pos - 7] == 0x96
        {
            self.last_read_address = decode_address_field(&self.track_data[pos - 6..pos]);
            self.last_read_sector_data_position = pos + 8;
        }

        self.drive.byte_position += 1;
        if self.drive.byte_position == TRACK_DATA_BYTES {
            self.drive.byte_position = 0;
        }

        result
    }

    /// Feed one byte written to the data register. The OS first writes
    /// padding and the data prologue, then the 0x156 encoded bytes; once
    /// they are all in, the sector is decoded and stored back into the
    /// image, and the track buffer is regenerated for that sector.
    pub fn write_track_data(&mut self, value: u8) {
        match &mut self.write_state {
            SectorWriteState::WaitingForDataPrologue { buf, len } => {
                if *len >= PROLOGUE_SEARCH_LIMIT {
                    self.write_state = SectorWriteState::default();
                    return;
                }

                buf[*len] = value;
                *len += 1;

                if *len > 2 && buf[*len - 3..*len] == [0xd5, 0xaa, 0xad] {
                    self.write_state = SectorWriteState::ReceivingData {
                        address: self.last_read_address,
                        data: [0; ENCODED_SECTOR_BYTES],
                        len: 0,
                    };
                }
            }
            SectorWriteState::ReceivingData { address, data, len } => {
                data[*len] = value;
                *len += 1;
                if *len < ENCODED_SECTOR_BYTES {
                    return;
                }

                let address = *address;
                let mut raw = *data;
                self.write_state = SectorWriteState::default();

                // Reverse the EOR chain back to 6-bit values
                let mut a = 0u8;
                for byte in raw.iter_mut() {
                    a ^= SIX_TWO_DECODE[*byte as usize];
                    *byte = a;
                }

                let sector = decode_sector_data(&mut raw);

                let physical_sector = address.sector;
                let logical_sector = DOS33_SECTOR_INTERLEAVE[physical_sector as usize];
                let start = Self::sector_offset(address.track, logical_sector);
                self.image[start..start + SECTOR_BYTES].copy_from_slice(&sector);
                self.make_sector_data(address.track, physical_sector);
                self.dirty = true;

                log!(
                    LogCategory::Disk,
                    LogLevel::Debug,
                    "Disk: wrote track {} sector {}",
                    address.track,
                    physical_sector
                );
            }
        }
    }
}
