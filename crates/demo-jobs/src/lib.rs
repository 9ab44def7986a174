// Illustrative job specs and task handlers used to exercise the
// orchestrator end to end. They carry no geospatial logic; production
// deployments register their own handlers in their place.

pub mod handlers;
pub mod specs;

pub use handlers::{ArithmeticSquareHandler, EchoHandler, LongRunningHandler, SumHandler};
pub use specs::{EchoJobSpec, FanOutSquaresJobSpec, LongRunningJobSpec, TimeoutDemoJobSpec, TwoStageSumJobSpec};
