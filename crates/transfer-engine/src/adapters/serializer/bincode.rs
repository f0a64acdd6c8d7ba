use crate::domain::errors::SerializationError;
use crate::ports::outbound::RecordSerializer;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Default record serializer using bincode.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeRecordSerializer;

impl RecordSerializer for BincodeRecordSerializer {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        bincode::serialize(value).map_err(|e| SerializationError {
            message: e.to_string(),
        })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        bincode::deserialize(bytes).map_err(|e| SerializationError {
            message: e.to_string(),
        })
    }
}
