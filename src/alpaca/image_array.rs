//! The image-array codec (§4.4): decode an Alpaca camera frame from either
//! the binary `application/imagebytes` transmission or the JSON `Value`
//! array fallback.
//!
//! The 44-byte `ImageBytesMetadata` header layout below is taken verbatim
//! from the ASCOM ImageBytes specification as implemented in the lineage
//! crate's `api/image_array/mod.rs`. §9 flags that the original's decoder
//! returned empty sequences; this is a full, working implementation.

use crate::alpaca::device::AlpacaDeviceClient;
use crate::errors::ErrorKind;
use bytemuck::{Pod, Zeroable};
use serde::de::DeserializeOwned;
use serde_json::Value;

const IMAGE_BYTES_CONTENT_TYPE: &str = "application/imagebytes";

/// An element type the codec can decode an image array into (§4.4:
/// `T ∈ {uint16, uint32}`).
pub trait ImageElement: Sized + Copy + Pod + DeserializeOwned {
    /// The Alpaca `ImageElementType`/`TransmissionElementType` code for
    /// this element type.
    const ELEMENT_TYPE: i32;
}

impl ImageElement for u16 {
    const ELEMENT_TYPE: i32 = 8;
}

impl ImageElement for u32 {
    // Alpaca has no unsigned 32-bit transmission type; unsigned 32-bit
    // payloads are carried as the signed Int32 wire type and reinterpreted.
    const ELEMENT_TYPE: i32 = 2;
}

/// The 44-byte binary header preceding an `ImageBytes` payload (§4.4).
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
struct ImageBytesMetadata {
    metadata_version: i32,
    error_number: i32,
    client_transaction_id: i32,
    server_transaction_id: i32,
    data_start: i32,
    image_element_type: i32,
    transmission_element_type: i32,
    rank: i32,
    dimension_1: i32,
    dimension_2: i32,
    dimension_3: i32,
}

const METADATA_SIZE: usize = std::mem::size_of::<ImageBytesMetadata>();

/// Retrieves and decodes the current camera frame (`GET imagearray`) into
/// a dense row-major pixel sequence of element type `T` (§4.4).
pub(crate) async fn get_image_array<T: ImageElement>(
    client: &AlpacaDeviceClient,
) -> Result<Vec<T>, ErrorKind> {
    let descriptor = client.descriptor();
    let path = format!(
        "{device_type}/{device_number}/imagearray",
        device_type = descriptor.kind.as_str(),
        device_number = descriptor.device_number,
    );
    let (content_type, body) = client
        .transport()
        .perform_raw_get(&descriptor.host, descriptor.port, descriptor.tls, &path)
        .await?;

    if content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(IMAGE_BYTES_CONTENT_TYPE))
    {
        decode_image_bytes::<T>(&body)
    } else {
        let value: Value = serde_json::from_slice(&body).map_err(|_| ErrorKind::ParseError)?;
        decode_json_array::<T>(&value)
    }
}

fn decode_image_bytes<T: ImageElement>(body: &[u8]) -> Result<Vec<T>, ErrorKind> {
    if body.len() < METADATA_SIZE {
        return Err(ErrorKind::ParseError);
    }
    let metadata: ImageBytesMetadata =
        *bytemuck::try_from_bytes(&body[..METADATA_SIZE]).map_err(|_| ErrorKind::ParseError)?;

    if metadata.error_number != 0 {
        return Err(ErrorKind::from_error_number(
            u32::try_from(metadata.error_number).unwrap_or(u32::MAX),
        ));
    }
    if metadata.transmission_element_type != T::ELEMENT_TYPE {
        return Err(ErrorKind::ParseError);
    }

    let data_start = usize::try_from(metadata.data_start).map_err(|_| ErrorKind::ParseError)?;
    if data_start > body.len() {
        return Err(ErrorKind::ParseError);
    }

    let dims = [
        metadata.dimension_1,
        metadata.dimension_2,
        metadata.dimension_3,
    ];
    let rank = usize::try_from(metadata.rank).map_err(|_| ErrorKind::ParseError)?;
    if !(2..=3).contains(&rank) {
        return Err(ErrorKind::ParseError);
    }
    let element_count: i64 = dims[..rank].iter().map(|&dim| i64::from(dim.max(0))).product();
    let element_count = usize::try_from(element_count).map_err(|_| ErrorKind::ParseError)?;

    let payload = &body[data_start..];
    let element_size = std::mem::size_of::<T>();
    if payload.len() < element_count * element_size {
        return Err(ErrorKind::ParseError);
    }

    let elements: &[T] = bytemuck::try_cast_slice(&payload[..element_count * element_size])
        .map_err(|_| ErrorKind::ParseError)?;
    Ok(elements.to_vec())
}

fn decode_json_array<T: ImageElement>(value: &Value) -> Result<Vec<T>, ErrorKind> {
    let object = value.as_object().ok_or(ErrorKind::ParseError)?;
    let rows = object
        .get("Value")
        .and_then(Value::as_array)
        .ok_or(ErrorKind::ParseError)?;

    let mut flattened = Vec::new();
    for row in rows {
        let columns = row.as_array().ok_or(ErrorKind::ParseError)?;
        for cell in columns {
            // 2D camera arrays: each cell is a pixel value. 3D (colour)
            // arrays nest one level further; flatten that too.
            if let Some(plane) = cell.as_array() {
                for pixel in plane {
                    flattened.push(decode_number::<T>(pixel)?);
                }
            } else {
                flattened.push(decode_number::<T>(cell)?);
            }
        }
    }
    Ok(flattened)
}

fn decode_number<T: ImageElement>(value: &Value) -> Result<T, ErrorKind> {
    serde_json::from_value(value.clone()).map_err(|_| ErrorKind::ParseError)
}
