pub mod dto;
pub mod result;
pub mod status;

pub use dto::{
    ExploreRequest, ExploreResponse, HomeDocument, HomeRequest, TestCase, TestRequest,
    TestResponse,
};
pub use result::{RunSummary, TestRunState};
pub use status::TestState;
