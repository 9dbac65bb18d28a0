//! Step XML fragment format.
//!
//! ```xml
//! <empty_is_null>Y</empty_is_null>
//! <fields>
//!   <field>
//!     <output_field>phone</output_field>
//!     <value_type>None</value_type>
//!     <remove>Y</remove>
//!     <input_field_a>home_phone</input_field_a>
//!     <input_field_b>work_phone</input_field_b>
//!     <input_field_c>mobile_phone</input_field_c>
//!   </field>
//! </fields>
//! ```
//!
//! Candidate slots beyond the third continue with `input_field_d`,
//! `input_field_e`, and so on. Missing tags read as empty strings or defaults.
//! Enclosing elements (such as a `<step>` wrapper) are ignored.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;

use super::{parse_flag, CoalesceConfig, OutputSpec, DEFAULT_CANDIDATE_SLOTS};
use crate::error::{ConfigError, ConfigResult};
use crate::models::ValueType;

pub const TAG_EMPTY_IS_NULL: &str = "empty_is_null";
pub const TAG_FIELDS: &str = "fields";
pub const TAG_FIELD: &str = "field";
pub const TAG_OUTPUT_FIELD: &str = "output_field";
pub const TAG_VALUE_TYPE: &str = "value_type";
pub const TAG_REMOVE: &str = "remove";
pub const INPUT_FIELD_PREFIX: &str = "input_field_";

/// Largest number of candidate slots the lettered keys can express.
pub const MAX_CANDIDATE_SLOTS: usize = 26;

/// Key of the candidate slot at `index` (`input_field_a`, `input_field_b`, ...).
pub fn input_field_key(index: usize) -> ConfigResult<String> {
    if index >= MAX_CANDIDATE_SLOTS {
        return Err(ConfigError::Xml(format!(
            "at most {} input fields per output are supported",
            MAX_CANDIDATE_SLOTS
        )));
    }
    Ok(format!("{}{}", INPUT_FIELD_PREFIX, (b'a' + index as u8) as char))
}

/// Slot index of an `input_field_x` key.
pub fn input_field_index(key: &str) -> Option<usize> {
    let suffix = key.strip_prefix(INPUT_FIELD_PREFIX)?;
    let mut chars = suffix.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_lowercase() => Some((c as u8 - b'a') as usize),
        _ => None,
    }
}

/// Render a Y/N flag.
pub fn flag(value: bool) -> &'static str {
    if value {
        "Y"
    } else {
        "N"
    }
}

fn write_event<'a>(writer: &mut Writer<Vec<u8>>, event: Event<'a>) -> ConfigResult<()> {
    writer
        .write_event(event)
        .map_err(|e| ConfigError::Xml(e.to_string()))
}

fn write_tag(writer: &mut Writer<Vec<u8>>, tag: &str, value: &str) -> ConfigResult<()> {
    if value.is_empty() {
        return write_event(writer, Event::Empty(BytesStart::new(tag)));
    }
    write_event(writer, Event::Start(BytesStart::new(tag)))?;
    write_event(writer, Event::Text(BytesText::new(value)))?;
    write_event(writer, Event::End(BytesEnd::new(tag)))
}

/// Serialize a configuration to a step XML fragment.
pub fn to_xml(config: &CoalesceConfig) -> ConfigResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    write_tag(&mut writer, TAG_EMPTY_IS_NULL, flag(config.empty_is_null))?;
    write_event(&mut writer, Event::Start(BytesStart::new(TAG_FIELDS)))?;

    for spec in &config.fields {
        write_event(&mut writer, Event::Start(BytesStart::new(TAG_FIELD)))?;
        write_tag(&mut writer, TAG_OUTPUT_FIELD, &spec.output_name)?;
        write_tag(&mut writer, TAG_VALUE_TYPE, spec.value_type.as_str())?;
        write_tag(&mut writer, TAG_REMOVE, flag(spec.remove))?;
        for (i, candidate) in spec.candidates.iter().enumerate() {
            write_tag(&mut writer, &input_field_key(i)?, candidate)?;
        }
        write_event(&mut writer, Event::End(BytesEnd::new(TAG_FIELD)))?;
    }

    write_event(&mut writer, Event::End(BytesEnd::new(TAG_FIELDS)))?;

    String::from_utf8(writer.into_inner()).map_err(|e| ConfigError::Xml(e.to_string()))
}

/// Output spec under construction while reading a `<field>` element.
#[derive(Default)]
struct FieldDraft {
    output_name: String,
    value_type: String,
    remove: String,
    candidates: BTreeMap<usize, String>,
}

impl FieldDraft {
    fn set(&mut self, tag: &str, value: String) {
        match tag {
            TAG_OUTPUT_FIELD => self.output_name = value,
            TAG_VALUE_TYPE => self.value_type = value,
            TAG_REMOVE => self.remove = value,
            other => {
                if let Some(index) = input_field_index(other) {
                    self.candidates.insert(index, value);
                }
            }
        }
    }

    fn finish(self) -> ConfigResult<OutputSpec> {
        let slots = self
            .candidates
            .keys()
            .next_back()
            .map_or(0, |last| last + 1)
            .max(DEFAULT_CANDIDATE_SLOTS);
        let mut candidates = vec![String::new(); slots];
        for (index, value) in self.candidates {
            candidates[index] = value;
        }

        Ok(OutputSpec {
            output_name: self.output_name,
            candidates,
            value_type: self.value_type.parse::<ValueType>()?,
            remove: parse_flag(&self.remove).unwrap_or(false),
        })
    }
}

/// Read a configuration from a step XML fragment.
pub fn from_xml(xml: &str) -> ConfigResult<CoalesceConfig> {
    let mut reader = Reader::from_str(xml);

    let mut config = CoalesceConfig::new();
    let mut draft: Option<FieldDraft> = None;
    let mut open_tag: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == TAG_FIELD {
                    draft = Some(FieldDraft::default());
                } else {
                    open_tag = Some(name);
                    text.clear();
                }
            }
            // indentation between tags; names keep their own whitespace
            Event::Text(e) => {
                if open_tag.is_some() && !e.iter().all(u8::is_ascii_whitespace) {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if open_tag.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == TAG_FIELD {
                    if let Some(finished) = draft.take() {
                        config.fields.push(finished.finish()?);
                    }
                } else if open_tag.as_deref() == Some(name.as_str()) {
                    assign(&mut config, draft.as_mut(), &name, std::mem::take(&mut text));
                    open_tag = None;
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == TAG_FIELD {
                    config.fields.push(FieldDraft::default().finish()?);
                } else {
                    assign(&mut config, draft.as_mut(), &name, String::new());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if draft.is_some() {
        return Err(ConfigError::Xml(format!("unclosed <{}> element", TAG_FIELD)));
    }

    Ok(config)
}

fn assign(config: &mut CoalesceConfig, draft: Option<&mut FieldDraft>, tag: &str, value: String) {
    match draft {
        Some(field) => field.set(tag, value),
        None if tag == TAG_EMPTY_IS_NULL => {
            if let Some(flag) = parse_flag(&value) {
                config.empty_is_null = flag;
            }
        }
        None => {}
    }
}
