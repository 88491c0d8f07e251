use crate::providers::memory::MemoryRecord;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemoriesResponse {
    /// Records exactly as the memory service returned them.
    #[schema(value_type = Vec<Object>)]
    pub memories: Vec<MemoryRecord>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteMemoryQuery {
    /// Id of the memory to delete.
    pub id: Option<String>,
}
