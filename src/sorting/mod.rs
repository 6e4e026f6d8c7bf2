pub mod classifier;
pub mod collision;
pub mod mover;
mod pipeline;

pub use pipeline::{
    relocate, render_file_name, room_directory, Disposition, Relocation, Sorter, UntouchedReason,
};
