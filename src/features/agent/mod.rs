mod agent_loop;

pub use agent_loop::{AgentLoop, AgentState, CycleOutcome, CycleStats};
