//! H.264 Sequence Parameter Set parsing (7.3.2.1.1).
//!
//! Parses up to and including `vui_parameters_present_flag`: enough for
//! profile, level and the cropped picture geometry. VUI is not parsed.

use crate::bitreader::BitReader;
use crate::error::{Error, Result};
use crate::nal::{forbidden_bit, remove_emulation_prevention};

/// NAL unit type of an SPS.
pub const SPS_NAL_TYPE: u8 = 7;

/// H.264 profile_idc values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    Cavlc444Intra,
    Baseline,
    Main,
    ScalableBaseline,
    ScalableHigh,
    Extended,
    High,
    High10,
    MultiviewHigh,
    High422,
    StereoHigh,
    MultiviewDepthHigh,
    EnhancedMultiviewDepthHigh,
    High444Predictive,
    /// Multi-resolution frame-compatible profiles (138, 139).
    MfcDepthHigh(u8),
}

impl TryFrom<u8> for Profile {
    type Error = Error;

    fn try_from(idc: u8) -> Result<Self> {
        Ok(match idc {
            44 => Profile::Cavlc444Intra,
            66 => Profile::Baseline,
            77 => Profile::Main,
            83 => Profile::ScalableBaseline,
            86 => Profile::ScalableHigh,
            88 => Profile::Extended,
            100 => Profile::High,
            110 => Profile::High10,
            118 => Profile::MultiviewHigh,
            122 => Profile::High422,
            128 => Profile::StereoHigh,
            134 => Profile::MultiviewDepthHigh,
            135 => Profile::EnhancedMultiviewDepthHigh,
            244 => Profile::High444Predictive,
            138 | 139 => Profile::MfcDepthHigh(idc),
            other => return Err(Error::UnknownProfile(other)),
        })
    }
}

impl Profile {
    pub fn idc(self) -> u8 {
        match self {
            Profile::Cavlc444Intra => 44,
            Profile::Baseline => 66,
            Profile::Main => 77,
            Profile::ScalableBaseline => 83,
            Profile::ScalableHigh => 86,
            Profile::Extended => 88,
            Profile::High => 100,
            Profile::High10 => 110,
            Profile::MultiviewHigh => 118,
            Profile::High422 => 122,
            Profile::StereoHigh => 128,
            Profile::MultiviewDepthHigh => 134,
            Profile::EnhancedMultiviewDepthHigh => 135,
            Profile::High444Predictive => 244,
            Profile::MfcDepthHigh(idc) => idc,
        }
    }

    /// Profiles whose SPS carries chroma format, bit depth and scaling lists.
    pub fn has_chroma_info(self) -> bool {
        !matches!(
            self,
            Profile::Baseline | Profile::Main | Profile::Extended
        )
    }
}

/// Decoded SPS fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    pub profile: Profile,
    /// constraint_set0..5 flags and reserved bits, as one byte.
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane: bool,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub log2_max_frame_num_minus4: u32,
    pub pic_order_cnt_type: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub max_num_ref_frames: u32,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only: bool,
    pub frame_crop: Option<FrameCrop>,
    pub vui_parameters_present: bool,
}

/// frame_crop_*_offset values, in crop units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCrop {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// Largest pic_width_in_mbs_minus1 / pic_height_in_map_units_minus1
/// accepted: 16384 luma samples per side.
pub const MAX_PIC_SIZE_IN_MBS_MINUS1: u32 = 1023;

fn check(field: &'static str, value: u32, max: u32) -> Result<u32> {
    if value > max {
        return Err(Error::out_of_range(field, value));
    }
    Ok(value)
}

fn check_signed(field: &'static str, value: i32, min: i32, max: i32) -> Result<i32> {
    if !(min..=max).contains(&value) {
        return Err(Error::out_of_range(field, value));
    }
    Ok(value)
}

impl Sps {
    /// Parse an SPS NAL unit, header byte included.
    pub fn parse(nalu: &[u8]) -> Result<Self> {
        let header = *nalu.first().ok_or(Error::BitstreamExhausted)?;
        if forbidden_bit(header) {
            return Err(Error::ForbiddenBit);
        }
        let unit_type = header & 0x1F;
        if unit_type != SPS_NAL_TYPE {
            return Err(Error::WrongUnitType {
                expected: SPS_NAL_TYPE,
                found: unit_type,
            });
        }

        let rbsp = remove_emulation_prevention(&nalu[1..]);
        let mut r = BitReader::new(&rbsp);

        let profile = Profile::try_from(r.read_u8()?)?;
        let constraint_flags = r.read_u8()?;
        let level_idc = r.read_u8()?;
        let seq_parameter_set_id = check("seq_parameter_set_id", r.read_ue()?, 31)?;

        let mut chroma_format_idc = 1;
        let mut separate_colour_plane = false;
        let mut bit_depth_luma_minus8 = 0;
        let mut bit_depth_chroma_minus8 = 0;
        if profile.has_chroma_info() {
            chroma_format_idc = check("chroma_format_idc", r.read_ue()?, 3)?;
            if chroma_format_idc == 3 {
                separate_colour_plane = r.read_flag()?;
            }
            bit_depth_luma_minus8 = check("bit_depth_luma_minus8", r.read_ue()?, 6)?;
            bit_depth_chroma_minus8 = check("bit_depth_chroma_minus8", r.read_ue()?, 6)?;
            let _qpprime_y_zero_transform_bypass = r.read_flag()?;
            if r.read_flag()? {
                let lists = if chroma_format_idc == 3 { 12 } else { 8 };
                for i in 0..lists {
                    if r.read_flag()? {
                        skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        let log2_max_frame_num_minus4 = check("log2_max_frame_num_minus4", r.read_ue()?, 12)?;
        let pic_order_cnt_type = check("pic_order_cnt_type", r.read_ue()?, 2)?;
        let mut log2_max_pic_order_cnt_lsb_minus4 = 0;
        match pic_order_cnt_type {
            0 => {
                log2_max_pic_order_cnt_lsb_minus4 =
                    check("log2_max_pic_order_cnt_lsb_minus4", r.read_ue()?, 12)?;
            }
            1 => {
                let _delta_pic_order_always_zero = r.read_flag()?;
                let _offset_for_non_ref_pic = r.read_se()?;
                let _offset_for_top_to_bottom_field = r.read_se()?;
                let cycle = check("num_ref_frames_in_pic_order_cnt_cycle", r.read_ue()?, 255)?;
                for _ in 0..cycle {
                    let _offset_for_ref_frame = r.read_se()?;
                }
            }
            _ => {}
        }

        let max_num_ref_frames = r.read_ue()?;
        let _gaps_in_frame_num_allowed = r.read_flag()?;
        let pic_width_in_mbs_minus1 = check(
            "pic_width_in_mbs_minus1",
            r.read_ue()?,
            MAX_PIC_SIZE_IN_MBS_MINUS1,
        )?;
        let pic_height_in_map_units_minus1 = check(
            "pic_height_in_map_units_minus1",
            r.read_ue()?,
            MAX_PIC_SIZE_IN_MBS_MINUS1,
        )?;
        let frame_mbs_only = r.read_flag()?;
        if !frame_mbs_only {
            let _mb_adaptive_frame_field = r.read_flag()?;
        }
        let _direct_8x8_inference = r.read_flag()?;

        let frame_crop = if r.read_flag()? {
            Some(FrameCrop {
                left: r.read_ue()?,
                right: r.read_ue()?,
                top: r.read_ue()?,
                bottom: r.read_ue()?,
            })
        } else {
            None
        };
        let vui_parameters_present = r.read_flag()?;

        let sps = Self {
            profile,
            constraint_flags,
            level_idc,
            seq_parameter_set_id,
            chroma_format_idc,
            separate_colour_plane,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            log2_max_frame_num_minus4,
            pic_order_cnt_type,
            log2_max_pic_order_cnt_lsb_minus4,
            max_num_ref_frames,
            pic_width_in_mbs_minus1,
            pic_height_in_map_units_minus1,
            frame_mbs_only,
            frame_crop,
            vui_parameters_present,
        };
        sps.check_crop()?;
        Ok(sps)
    }

    /// Cropping must leave at least one sample in each direction.
    fn check_crop(&self) -> Result<()> {
        let Some(crop) = self.frame_crop else {
            return Ok(());
        };
        let (unit_x, unit_y) = self.crop_units();
        let horizontal = u64::from(unit_x) * (u64::from(crop.left) + u64::from(crop.right));
        if horizontal >= u64::from(self.coded_width()) {
            return Err(Error::out_of_range(
                "frame_crop_left_offset + frame_crop_right_offset",
                i64::try_from(horizontal).unwrap_or(i64::MAX),
            ));
        }
        let vertical = u64::from(unit_y) * (u64::from(crop.top) + u64::from(crop.bottom));
        if vertical >= u64::from(self.coded_height()) {
            return Err(Error::out_of_range(
                "frame_crop_top_offset + frame_crop_bottom_offset",
                i64::try_from(vertical).unwrap_or(i64::MAX),
            ));
        }
        Ok(())
    }

    /// (CropUnitX, CropUnitY) per equations 7-19 to 7-22.
    fn crop_units(&self) -> (u32, u32) {
        let field_factor = if self.frame_mbs_only { 1 } else { 2 };
        if self.chroma_format_idc == 0 || self.separate_colour_plane {
            return (1, field_factor);
        }
        let (sub_width_c, sub_height_c) = match self.chroma_format_idc {
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        };
        (sub_width_c, sub_height_c * field_factor)
    }

    /// Coded width before cropping.
    pub fn coded_width(&self) -> u32 {
        self.pic_width_in_mbs_minus1.saturating_add(1).saturating_mul(16)
    }

    /// Coded height before cropping.
    pub fn coded_height(&self) -> u32 {
        let field_factor = if self.frame_mbs_only { 1 } else { 2 };
        self.pic_height_in_map_units_minus1
            .saturating_add(1)
            .saturating_mul(16 * field_factor)
    }

    /// Displayed width after cropping.
    pub fn width(&self) -> u32 {
        let crop = self.frame_crop.unwrap_or_default();
        let (unit_x, _) = self.crop_units();
        self.coded_width()
            .saturating_sub(unit_x.saturating_mul(crop.left.saturating_add(crop.right)))
    }

    /// Displayed height after cropping.
    pub fn height(&self) -> u32 {
        let crop = self.frame_crop.unwrap_or_default();
        let (_, unit_y) = self.crop_units();
        self.coded_height()
            .saturating_sub(unit_y.saturating_mul(crop.top.saturating_add(crop.bottom)))
    }

    /// RFC 6381 codec string, e.g. `avc1.4D401E`.
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02X}{:02X}{:02X}",
            self.profile.idc(),
            self.constraint_flags,
            self.level_idc
        )
    }

    /// Level as a decimal number, 30 -> 3.0.
    pub fn level(&self) -> f32 {
        self.level_idc as f32 / 10.0
    }
}

fn skip_scaling_list(r: &mut BitReader<'_>, size: usize) -> Result<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = check_signed("delta_scale", r.read_se()?, -128, 127)?;
            next_scale = (last_scale + delta + 256).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}
