//! H.264 Picture Parameter Set parsing (7.3.2.2).
//!
//! Stops after `redundant_pic_cnt_present_flag`; the optional high-profile
//! tail (transform_8x8_mode_flag and later) is not parsed.

use crate::bitreader::BitReader;
use crate::error::{Error, Result};
use crate::nal::{forbidden_bit, remove_emulation_prevention};

/// NAL unit type of a PPS.
pub const PPS_NAL_TYPE: u8 = 8;

/// Decoded PPS fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    pub entropy_coding_mode: bool,
    pub bottom_field_pic_order_in_frame_present: bool,
    pub num_slice_groups_minus1: u32,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred: bool,
    pub weighted_bipred_idc: u32,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present: bool,
    pub constrained_intra_pred: bool,
    pub redundant_pic_cnt_present: bool,
}

fn check_max(field: &'static str, value: u32, max: u32) -> Result<u32> {
    if value > max {
        return Err(Error::out_of_range(field, value));
    }
    Ok(value)
}

fn check_range(field: &'static str, value: i32, min: i32, max: i32) -> Result<i32> {
    if !(min..=max).contains(&value) {
        return Err(Error::out_of_range(field, value));
    }
    Ok(value)
}

impl Pps {
    /// Parse a PPS NAL unit, header byte included.
    pub fn parse(nalu: &[u8]) -> Result<Self> {
        let header = *nalu.first().ok_or(Error::BitstreamExhausted)?;
        if forbidden_bit(header) {
            return Err(Error::ForbiddenBit);
        }
        let unit_type = header & 0x1F;
        if unit_type != PPS_NAL_TYPE {
            return Err(Error::WrongUnitType {
                expected: PPS_NAL_TYPE,
                found: unit_type,
            });
        }

        let rbsp = remove_emulation_prevention(&nalu[1..]);
        let mut r = BitReader::new(&rbsp);

        let pic_parameter_set_id = check_max("pic_parameter_set_id", r.read_ue()?, 255)?;
        let seq_parameter_set_id = check_max("seq_parameter_set_id", r.read_ue()?, 31)?;
        let entropy_coding_mode = r.read_flag()?;
        let bottom_field_pic_order_in_frame_present = r.read_flag()?;
        let num_slice_groups_minus1 = check_max("num_slice_groups_minus1", r.read_ue()?, 7)?;
        if num_slice_groups_minus1 > 0 {
            skip_slice_group_map(&mut r, num_slice_groups_minus1)?;
        }

        let num_ref_idx_l0_default_active_minus1 =
            check_max("num_ref_idx_l0_default_active_minus1", r.read_ue()?, 31)?;
        let num_ref_idx_l1_default_active_minus1 =
            check_max("num_ref_idx_l1_default_active_minus1", r.read_ue()?, 31)?;
        let weighted_pred = r.read_flag()?;
        let weighted_bipred_idc = check_max("weighted_bipred_idc", r.read_bits(2)?, 2)?;
        let pic_init_qp_minus26 = check_range("pic_init_qp_minus26", r.read_se()?, -26, 25)?;
        let pic_init_qs_minus26 = check_range("pic_init_qs_minus26", r.read_se()?, -26, 25)?;
        let chroma_qp_index_offset = check_range("chroma_qp_index_offset", r.read_se()?, -12, 12)?;
        let deblocking_filter_control_present = r.read_flag()?;
        let constrained_intra_pred = r.read_flag()?;
        let redundant_pic_cnt_present = r.read_flag()?;

        Ok(Self {
            pic_parameter_set_id,
            seq_parameter_set_id,
            entropy_coding_mode,
            bottom_field_pic_order_in_frame_present,
            num_slice_groups_minus1,
            num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_default_active_minus1,
            weighted_pred,
            weighted_bipred_idc,
            pic_init_qp_minus26,
            pic_init_qs_minus26,
            chroma_qp_index_offset,
            deblocking_filter_control_present,
            constrained_intra_pred,
            redundant_pic_cnt_present,
        })
    }
}

fn skip_slice_group_map(r: &mut BitReader<'_>, num_slice_groups_minus1: u32) -> Result<()> {
    let map_type = check_max("slice_group_map_type", r.read_ue()?, 6)?;
    match map_type {
        0 => {
            for _ in 0..=num_slice_groups_minus1 {
                let _run_length_minus1 = r.read_ue()?;
            }
        }
        2 => {
            for _ in 0..num_slice_groups_minus1 {
                let _top_left = r.read_ue()?;
                let _bottom_right = r.read_ue()?;
            }
        }
        3..=5 => {
            let _change_direction = r.read_flag()?;
            let _change_rate_minus1 = r.read_ue()?;
        }
        6 => {
            let pic_size_in_map_units = r.read_ue()? as usize + 1;
            // Ceil(Log2(num_slice_groups_minus1 + 1))
            let bits = (u32::BITS - num_slice_groups_minus1.leading_zeros()) as usize;
            r.skip_bits(pic_size_in_map_units * bits)?;
        }
        _ => {}
    }
    Ok(())
}
