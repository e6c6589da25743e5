//! Read and write configuration
//!
//! Both configurations are plain values. A record type adjusts them through
//! [`Record::configure_read`](crate::Record::configure_read) and
//! [`Record::configure_write`](crate::Record::configure_write); callers that
//! want full control pass a config straight to the `*_with` entry points.

use indexmap::IndexMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How per-cell conversion failures are handled during a decode pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnmarshalErrorHandling {
    /// Leave the field at its default value and keep going
    Ignore,
    /// Stop at the first failure
    #[default]
    Abort,
    /// Keep going, gathering failures up to `max_unmarshal_errors`
    Collect,
}

/// One entry of a drop-down list: the stored key and the text shown to users
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DropItem {
    pub key: String,
    pub value: String,
}

impl DropItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        DropItem {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Drop-down lists keyed by column tag, in insertion order
pub type DropListMap = IndexMap<String, Vec<DropItem>>;

/// Display tokens for `true` and `false`
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoolLabels {
    pub truthy: String,
    pub falsy: String,
}

impl BoolLabels {
    pub fn new(truthy: impl Into<String>, falsy: impl Into<String>) -> Self {
        BoolLabels {
            truthy: truthy.into(),
            falsy: falsy.into(),
        }
    }

    /// Token for a boolean value
    pub fn label(&self, value: bool) -> &str {
        if value {
            &self.truthy
        } else {
            &self.falsy
        }
    }

    /// Boolean value of a token, if it is one of the two labels
    pub fn parse(&self, text: &str) -> Option<bool> {
        if text == self.truthy {
            Some(true)
        } else if text == self.falsy {
            Some(false)
        } else {
            None
        }
    }
}

impl Default for BoolLabels {
    fn default() -> Self {
        BoolLabels::new("是", "否")
    }
}

/// Configuration of a decode pass
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReadConfig {
    /// Tag key looked up on record fields (default: `excel`)
    pub tag_name: String,
    /// Zero-based index of the sheet to read
    pub sheet_index: usize,
    /// Zero-based row holding the column headers
    pub header_row_index: usize,
    /// Zero-based row of the first record
    pub data_start_row_index: usize,
    /// Trim whitespace in the built-in string conversion
    pub trim_space: bool,
    /// chrono format strings tried in order on date cells holding text
    pub fallback_date_formats: Vec<String>,
    /// Skip columns whose header matches no field (default: true)
    pub skip_unknown_columns: bool,
    /// Skip columns whose field type has no read routine (default: false)
    pub skip_unknown_types: bool,
    pub unmarshal_error_handling: UnmarshalErrorHandling,
    /// Cap for [`UnmarshalErrorHandling::Collect`], 0 means unlimited (default: 10)
    pub max_unmarshal_errors: usize,
    /// Display value to key translation for string fields
    pub drop_lists: DropListMap,
    /// Leave optional fields at `None` when the cell text is empty
    pub pointer_can_nil: bool,
    /// Localized boolean tokens recognised before the canonical ones
    pub bool_labels: BoolLabels,
}

impl Default for ReadConfig {
    fn default() -> Self {
        ReadConfig {
            tag_name: "excel".to_string(),
            sheet_index: 0,
            header_row_index: 0,
            data_start_row_index: 1,
            trim_space: false,
            fallback_date_formats: Vec::new(),
            skip_unknown_columns: true,
            skip_unknown_types: false,
            unmarshal_error_handling: UnmarshalErrorHandling::Abort,
            max_unmarshal_errors: 10,
            drop_lists: DropListMap::new(),
            pointer_can_nil: false,
            bool_labels: BoolLabels::default(),
        }
    }
}

impl ReadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag_name(mut self, tag: impl Into<String>) -> Self {
        self.tag_name = tag.into();
        self
    }

    pub fn with_sheet_index(mut self, index: usize) -> Self {
        self.sheet_index = index;
        self
    }

    pub fn with_header_row(mut self, index: usize) -> Self {
        self.header_row_index = index;
        self
    }

    pub fn with_data_start_row(mut self, index: usize) -> Self {
        self.data_start_row_index = index;
        self
    }

    pub fn with_trim_space(mut self, trim: bool) -> Self {
        self.trim_space = trim;
        self
    }

    /// Append a fallback date format (chrono `strftime` syntax)
    pub fn with_fallback_date_format(mut self, format: impl Into<String>) -> Self {
        self.fallback_date_formats.push(format.into());
        self
    }

    pub fn with_skip_unknown_columns(mut self, skip: bool) -> Self {
        self.skip_unknown_columns = skip;
        self
    }

    pub fn with_skip_unknown_types(mut self, skip: bool) -> Self {
        self.skip_unknown_types = skip;
        self
    }

    pub fn with_error_handling(mut self, handling: UnmarshalErrorHandling) -> Self {
        self.unmarshal_error_handling = handling;
        self
    }

    pub fn with_max_unmarshal_errors(mut self, max: usize) -> Self {
        self.max_unmarshal_errors = max;
        self
    }

    /// Register the drop-down list of the column tagged `tag`
    pub fn with_drop_list(mut self, tag: impl Into<String>, items: Vec<DropItem>) -> Self {
        self.drop_lists.insert(tag.into(), items);
        self
    }

    pub fn with_pointer_can_nil(mut self, can_nil: bool) -> Self {
        self.pointer_can_nil = can_nil;
        self
    }

    pub fn with_bool_labels(mut self, labels: BoolLabels) -> Self {
        self.bool_labels = labels;
        self
    }
}

/// Configuration of an encode pass
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WriteConfig {
    /// Name of the sheet the records are written to (default: `Sheet1`)
    pub sheet_name: String,
    /// Tag key looked up on record fields (default: `excel`)
    pub tag_name: String,
    /// Leave out fields that do not declare the tag
    pub skip_no_tag: bool,
    /// Write `None` as an empty text cell instead of a blank cell
    pub skip_nil_pointer: bool,
    /// Key to display value translation for string fields
    pub drop_lists: DropListMap,
    /// Write booleans with `bool_labels` instead of TRUE/FALSE
    pub localized_bool: bool,
    pub bool_labels: BoolLabels,
    /// Excel number format applied to date cells
    pub write_time_format: String,
}

impl Default for WriteConfig {
    fn default() -> Self {
        WriteConfig {
            sheet_name: "Sheet1".to_string(),
            tag_name: "excel".to_string(),
            skip_no_tag: false,
            skip_nil_pointer: false,
            drop_lists: DropListMap::new(),
            localized_bool: false,
            bool_labels: BoolLabels::default(),
            write_time_format: "yyyy-mm-dd hh:mm:ss".to_string(),
        }
    }
}

impl WriteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    pub fn with_tag_name(mut self, tag: impl Into<String>) -> Self {
        self.tag_name = tag.into();
        self
    }

    pub fn with_skip_no_tag(mut self, skip: bool) -> Self {
        self.skip_no_tag = skip;
        self
    }

    pub fn with_skip_nil_pointer(mut self, skip: bool) -> Self {
        self.skip_nil_pointer = skip;
        self
    }

    /// Register the drop-down list of the column tagged `tag`
    pub fn with_drop_list(mut self, tag: impl Into<String>, items: Vec<DropItem>) -> Self {
        self.drop_lists.insert(tag.into(), items);
        self
    }

    pub fn with_localized_bool(mut self, localized: bool) -> Self {
        self.localized_bool = localized;
        self
    }

    pub fn with_bool_labels(mut self, labels: BoolLabels) -> Self {
        self.bool_labels = labels;
        self
    }

    pub fn with_time_format(mut self, format: impl Into<String>) -> Self {
        self.write_time_format = format.into();
        self
    }
}
