pub mod client_proxy;
pub mod closure;
pub mod directives;
pub mod dom_component;
pub(crate) mod exports;
pub mod restricted_imports;
pub mod rsc_hooks;
pub mod server_actions;
pub mod server_reference_proxy;
