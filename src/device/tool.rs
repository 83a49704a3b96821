use super::axis::AxisFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceToolType {
    Unknown,
    Pen,
    Eraser,
    Brush,
    Pencil,
    Airbrush,
    Mouse,
    Lens,
}

/// A physical tablet tool.
///
/// Tools are owned by their seat and shared with the device they are in
/// proximity of. The descriptor never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTool {
    serial: u64,
    hw_id: u64,
    tool_type: DeviceToolType,
    axes: AxisFlags,
}

impl DeviceTool {
    pub fn new(serial: u64, hw_id: u64, tool_type: DeviceToolType, axes: AxisFlags) -> Self {
        Self {
            serial,
            hw_id,
            tool_type,
            axes,
        }
    }

    /// Serial number, unique per physical tool across sessions.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Hardware (model) identifier.
    pub fn hardware_id(&self) -> u64 {
        self.hw_id
    }

    pub fn tool_type(&self) -> DeviceToolType {
        self.tool_type
    }

    pub fn axes(&self) -> AxisFlags {
        self.axes
    }

    pub fn matches(&self, serial: u64, hw_id: u64) -> bool {
        self.serial == serial && self.hw_id == hw_id
    }
}
