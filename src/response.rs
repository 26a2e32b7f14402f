use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct List<T> {
    list: Vec<T>,
    total: i64,
}

impl<T> List<T> {
    pub fn new(list: Vec<T>) -> Self {
        let total = list.len() as i64;
        List { list, total }
    }
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Uploaded {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct Session {
    pub id: uuid::Uuid,
    pub token: String,
}
