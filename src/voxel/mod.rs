pub mod buffer;
pub mod channel;

pub use buffer::VoxelBuffer;
pub use channel::{ChannelId, Compression, Depth, Packed4};
