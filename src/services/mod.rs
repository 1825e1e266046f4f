pub mod route_meta;
