use uuid::Uuid;

#[derive(Debug)]
pub struct UploadedFileCreate {
    pub name: String,
    pub extension: String,
    pub content: Vec<u8>,
    pub owner_id: Uuid,
}
