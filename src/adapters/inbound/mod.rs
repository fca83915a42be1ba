mod api_server;

pub use api_server::{customer_router, dvd_router, ApiServer, ApiState};

// Re-export for external use (e.g., integration tests)
#[allow(unused_imports)]
pub use api_server::{
    ApiError, CreateDvdRequest, CustomerApiState, CustomerRequest, DvdApiState, ErrorBody,
    HealthResponse, RentRequest,
};
