pub mod best_of_n;
pub mod concatenate;
pub mod intelligent_merge;
pub mod section_assembly;
pub mod weighted_blend;
