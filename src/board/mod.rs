// Gateway module for board - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod dashboard;
mod generators;
mod task;

// Public re-exports - the ONLY way to access board functionality
pub use dashboard::{Dashboard, DashboardReport, DashboardStores};
pub use generators::{
    insight_prompt, mood_for, mood_prompt, parse_mood_message, InsightGenerator, Mood,
    MoodMessage, MoodMessageGenerator,
};
pub use task::{insight_projection, load_tasks, mood_projection, BoardSummary, Task, TaskStatus};
