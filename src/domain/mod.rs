pub mod creator;
pub mod post;

pub use creator::Creator;
pub use post::{
    ContentBlock, FileBlock, GalleryBlock, MediaUrl, Post, ProductBlock, TextBlock,
};
