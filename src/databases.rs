use crate::database::Database;
use crate::modules::status::database::StatusDatabase;

pub struct Databases {
    pub status: Database<StatusDatabase>,
}

impl Databases {
    pub async fn open(data_path: &str) -> Result<Self, crate::database::DbError> {
        Ok(Self {
            status: Database::new(data_path).await?,
        })
    }
}
