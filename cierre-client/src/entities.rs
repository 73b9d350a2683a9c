//! Entity-related API endpoints

use cierre_core::domain::entity::Entity;

use crate::CierreClient;
use crate::error::Result;

impl CierreClient {
    /// Get a closing record (or sub-resource) with its authoritative `estado`
    ///
    /// # Arguments
    /// * `resource` - Resource path segment (e.g. "cierres")
    /// * `entity_id` - The entity id
    pub async fn get_entity(&self, resource: &str, entity_id: i64) -> Result<Entity> {
        let url = self.url(&format!("{}/{}", resource, entity_id));
        let response = self.authorized(self.client.get(&url)).send().await?;

        self.handle_response(response).await
    }
}
