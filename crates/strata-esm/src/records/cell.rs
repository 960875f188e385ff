use strata_common::FormId;

use crate::dialect::{tags, Dialect};
use crate::header::RecordHeader;
use crate::{EsmReader, Result};

/// Cell flag: the cell is an interior.
const INTERIOR: u32 = 0x01;

/// Header data of a cell record.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRecord {
    /// Dialect B form id as stored; zero in dialect A.
    pub form_id: FormId,
    pub name: String,
    pub flags: u32,
    /// Exterior grid coordinates.
    pub grid: Option<(i32, i32)>,
    pub deleted: bool,
}

impl CellRecord {
    /// Read the cell header subrecords.
    ///
    /// In dialect A the references follow inside the same record; reading
    /// stops at the first of them with its tag cached, so a context saved
    /// right after this call resumes on that reference.
    pub fn read(reader: &mut EsmReader, record: &RecordHeader) -> Result<Self> {
        let mut cell = Self {
            form_id: record.form_id,
            name: String::new(),
            flags: 0,
            grid: None,
            deleted: record.is_deleted(),
        };

        match reader.dialect() {
            Dialect::Tes3 => {
                cell.name = reader.get_hn_string(tags::NAME)?;
                while reader.has_more_subs() {
                    match reader.get_sub_name()? {
                        tags::DATA => {
                            let (flags, x, y) = reader.get_h_payload(|r| {
                                Ok((r.read_u32()?, r.read_i32()?, r.read_i32()?))
                            })?;
                            cell.flags = flags;
                            if flags & INTERIOR == 0 {
                                cell.grid = Some((x, y));
                            }
                        }
                        tags::DELE => {
                            reader.skip_h_sub()?;
                            cell.deleted = true;
                        }
                        tags::FRMR | tags::MVRF => {
                            reader.cache_sub_name();
                            break;
                        }
                        _ => reader.skip_h_sub()?,
                    }
                }
            }
            Dialect::Tes4 => {
                while reader.has_more_subs() {
                    match reader.get_sub_name()? {
                        tags::EDID => cell.name = reader.get_h_string()?,
                        tags::DATA => {
                            cell.flags = reader.get_h_payload(|r| {
                                Ok(if r.len() >= 2 {
                                    u32::from(r.read_u16()?)
                                } else {
                                    u32::from(r.read_u8()?)
                                })
                            })?;
                        }
                        tags::XCLC => {
                            cell.grid =
                                Some(reader.get_h_payload(|r| Ok((r.read_i32()?, r.read_i32()?)))?);
                        }
                        _ => reader.skip_h_sub()?,
                    }
                }
                if cell.is_interior() {
                    cell.grid = None;
                }
            }
        }
        Ok(cell)
    }

    /// Check the interior flag.
    #[inline]
    pub fn is_interior(&self) -> bool {
        self.flags & INTERIOR != 0
    }
}
