pub mod live;
pub mod session;
pub mod timeline;
pub mod unread;
