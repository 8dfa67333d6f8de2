pub mod listing_post;
pub mod modality;
pub mod post;
pub mod post_point;
