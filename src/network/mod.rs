// Node surface for peer sync

mod node;

pub use node::Node;
