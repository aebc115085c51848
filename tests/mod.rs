mod support;

mod health_tests;
mod retry_tests;
mod supervisor_tests;
