pub mod replied_review;

pub use replied_review::RepliedReview;
