pub mod history;
pub mod recommendations;
pub mod visualizer;

pub use history::user_history;
pub use recommendations::{get_recommendations, UserRecommendations, DEFAULT_TOP_N};
pub use visualizer::{plot_user_embeddings, render_graph, GraphData};
