//! Image metadata decoding
//!
//! The native layer describes an image as a UTF-16 XML fragment, either a
//! single `<IMAGE INDEX="n">` element or a list whose children are such
//! elements. Only a handful of fields are surfaced, as a flat [`ImageInfo`].

use crate::core::error::{Result, WimError};
use serde::{Deserialize, Serialize};

/// Byte order mark, as it appears at the start of little-endian text
const UTF16_BOM: u16 = 0xFEFF;

/// Flat description of one image in a container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// 1-based index inside the container (0 when absent)
    pub index: i32,
    pub name: String,
    pub description: String,
    pub flags: String,
    pub architecture: String,
}

#[derive(Debug, Default, Deserialize)]
struct ImageNode {
    #[serde(rename = "@INDEX", default)]
    index: i32,
    #[serde(rename = "NAME", default)]
    name: String,
    #[serde(rename = "DESCRIPTION", default)]
    description: String,
    #[serde(rename = "FLAGS", default)]
    flags: String,
    #[serde(rename = "WINDOWS", default)]
    windows: WindowsNode,
}

#[derive(Debug, Default, Deserialize)]
struct WindowsNode {
    #[serde(rename = "ARCH", default)]
    arch: String,
}

#[derive(Debug, Default, Deserialize)]
struct ImageListNode {
    #[serde(rename = "IMAGE", default)]
    images: Vec<ImageNode>,
}

impl From<ImageNode> for ImageInfo {
    fn from(node: ImageNode) -> Self {
        Self {
            index: node.index,
            name: node.name,
            description: node.description,
            flags: node.flags,
            architecture: node.windows.arch,
        }
    }
}

/// Decode little-endian UTF-16 bytes up to the first NUL.
///
/// A leading byte order mark is dropped; a trailing odd byte is ignored.
pub fn decode_utf16_bytes(bytes: &[u8]) -> String {
    let mut units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .peekable();

    if units.peek() == Some(&UTF16_BOM) {
        units.next();
    }

    let units: Vec<u16> = units.take_while(|&unit| unit != 0).collect();
    String::from_utf16_lossy(&units)
}

/// Decode an image metadata fragment.
///
/// Empty text yields a zero-valued [`ImageInfo`]. A fragment that does not
/// look like a single image (no index and no name) is read as a list and
/// its first image is used; other elements may sit between the images.
pub fn decode_image_info(xml: &str) -> Result<ImageInfo> {
    let xml = xml.trim();
    if xml.is_empty() {
        return Ok(ImageInfo::default());
    }

    let node: ImageNode = quick_xml::de::from_str(xml)
        .map_err(|e| WimError::InfoDecodeFailed(e.to_string()))?;
    if node.index != 0 || !node.name.is_empty() {
        return Ok(node.into());
    }

    let list: ImageListNode = quick_xml::de::from_str(xml)
        .map_err(|e| WimError::InfoDecodeFailed(e.to_string()))?;
    Ok(list
        .images
        .into_iter()
        .next()
        .map(ImageInfo::from)
        .unwrap_or_default())
}

/// Decode the raw metadata blob returned by the native layer
pub fn decode_image_info_bytes(bytes: &[u8]) -> Result<ImageInfo> {
    decode_image_info(&decode_utf16_bytes(bytes))
}

/// Render an image fragment in the shape the native layer produces.
///
/// Empty fields are left out, as the native layer does.
pub fn encode_image_info(info: &ImageInfo) -> String {
    let mut xml = format!("<IMAGE INDEX=\"{}\">", info.index);
    for (tag, value) in [
        ("NAME", &info.name),
        ("DESCRIPTION", &info.description),
        ("FLAGS", &info.flags),
    ] {
        if !value.is_empty() {
            xml.push_str(&format!("<{tag}>{}</{tag}>", quick_xml::escape::escape(value.as_str())));
        }
    }
    if !info.architecture.is_empty() {
        xml.push_str(&format!(
            "<WINDOWS><ARCH>{}</ARCH></WINDOWS>",
            quick_xml::escape::escape(info.architecture.as_str())
        ));
    }
    xml.push_str("</IMAGE>");
    xml
}

/// Little-endian UTF-16 with a byte order mark and NUL terminator
pub fn encode_utf16_bytes(text: &str) -> Vec<u8> {
    std::iter::once(UTF16_BOM)
        .chain(text.encode_utf16())
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}
