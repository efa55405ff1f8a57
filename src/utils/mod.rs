pub mod decode;
pub mod url;
