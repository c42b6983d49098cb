mod helpers;

mod gateway_test;
mod identity_test;
mod session_test;
mod workflow_test;
