// Enterprise authentication service
//
// Password login with brute-force lockout, signed access tokens carrying
// role and permission claims, and single-use rotating refresh tokens.

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod routes;
pub mod validation;
