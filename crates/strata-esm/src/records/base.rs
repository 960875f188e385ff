use crate::dialect::{tags, Dialect};
use crate::header::RecordHeader;
use crate::{Category, EsmReader, Error, Result};

use super::RawId;

/// The subset of a base record that references need: identity and display data.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseRecord {
    pub category: Category,
    pub id: RawId,
    pub editor_id: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
    pub deleted: bool,
}

impl BaseRecord {
    /// Read a base record whose header was just returned by the reader.
    pub fn read(reader: &mut EsmReader, record: &RecordHeader, category: Category) -> Result<Self> {
        let mut base = Self {
            category,
            id: RawId::Form(record.form_id),
            editor_id: None,
            model: None,
            name: None,
            deleted: record.is_deleted(),
        };

        match reader.dialect() {
            Dialect::Tes3 => {
                let mut id = None;
                while reader.has_more_subs() {
                    match reader.get_sub_name()? {
                        tags::NAME => id = Some(reader.get_h_string()?),
                        tags::MODL => base.model = Some(reader.get_h_string()?),
                        tags::FNAM => base.name = Some(reader.get_h_string()?),
                        tags::DELE => {
                            reader.skip_h_sub()?;
                            base.deleted = true;
                        }
                        _ => reader.skip_h_sub()?,
                    }
                }
                let id = id.ok_or(Error::MissingSubrecord {
                    record: record.tag,
                    expected: tags::NAME,
                })?;
                base.editor_id = Some(id.clone());
                base.id = RawId::Name(id);
            }
            Dialect::Tes4 => {
                while reader.has_more_subs() {
                    match reader.get_sub_name()? {
                        tags::EDID => base.editor_id = Some(reader.get_h_string()?),
                        tags::MODL => base.model = Some(reader.get_h_string()?),
                        tags::FULL => base.name = Some(reader.get_h_string()?),
                        _ => reader.skip_h_sub()?,
                    }
                }
            }
        }
        Ok(base)
    }
}
