use crate::error::{Result, ZimError};
use std::collections::BTreeMap;
use std::fmt;

const NAME_PREFIX: &str = "Illustration_";

/// Size and device-pixel scale of an illustration stored in metadata
#[derive(Debug, Clone, PartialEq)]
pub struct IllustrationInfo {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
    pub extra_attributes: BTreeMap<String, String>,
}

impl IllustrationInfo {
    pub fn new(width: u32, height: u32, scale: f32) -> Self {
        Self {
            width,
            height,
            scale,
            extra_attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.extra_attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Metadata key holding this illustration, e.g. `Illustration_48x48@2`
    pub fn as_metadata_item_name(&self) -> String {
        let mut name = format!("{}{}x{}@{}", NAME_PREFIX, self.width, self.height, self.scale);
        for (key, value) in &self.extra_attributes {
            name.push(';');
            name.push_str(key);
            name.push('=');
            name.push_str(value);
        }
        name
    }

    /// Parse a metadata key produced by [`as_metadata_item_name`](Self::as_metadata_item_name)
    pub fn from_metadata_item_name(name: &str) -> Result<Self> {
        let invalid = || {
            ZimError::ContractViolation(format!("{:?} is not a valid illustration name", name))
        };

        let rest = name.strip_prefix(NAME_PREFIX).ok_or_else(invalid)?;
        let mut parts = rest.split(';');
        let dims = parts.next().ok_or_else(invalid)?;
        let (size, scale) = dims.split_once('@').ok_or_else(invalid)?;
        let (width, height) = size.split_once('x').ok_or_else(invalid)?;

        let width: u32 = width.parse().map_err(|_| invalid())?;
        let height: u32 = height.parse().map_err(|_| invalid())?;
        let scale: f32 = scale.parse().map_err(|_| invalid())?;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(invalid());
        }

        let mut extra_attributes = BTreeMap::new();
        for attr in parts {
            let (key, value) = attr.split_once('=').ok_or_else(invalid)?;
            extra_attributes.insert(key.to_string(), value.to_string());
        }

        Ok(Self {
            width,
            height,
            scale,
            extra_attributes,
        })
    }

    /// Whether `name` looks like an illustration key
    pub fn is_illustration_name(name: &str) -> bool {
        Self::from_metadata_item_name(name).is_ok()
    }
}

impl Default for IllustrationInfo {
    fn default() -> Self {
        Self::new(0, 0, 1.0)
    }
}

/// Square illustration at scale 1
impl From<u32> for IllustrationInfo {
    fn from(size: u32) -> Self {
        Self::new(size, size, 1.0)
    }
}

impl From<(u32, u32, f32)> for IllustrationInfo {
    fn from((width, height, scale): (u32, u32, f32)) -> Self {
        Self::new(width, height, scale)
    }
}

impl fmt::Display for IllustrationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.scale)
    }
}
