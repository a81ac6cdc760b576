//! ImuSample / GnssSample - parsed measurement payloads
//!
//! 字段未在输出位图中启用时保持默认值: 数值为 0, 姿态为单位四元数与单位矩阵。

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// 单个 IMU 采样
///
/// 字段顺序即事件转发 (relay) 的线上顺序。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// 时间戳 (秒)
    pub timestamp: f64,
    /// 设备帧计数
    pub frame_count: i32,
    /// 校准后加速度 (g)
    pub a: [f32; 3],
    /// 校准后角速度 (deg/s)
    pub g: [f32; 3],
    /// 校准后磁场 (uT)
    pub b: [f32; 3],
    /// 原始加速度
    pub a_raw: [f32; 3],
    /// 原始角速度
    pub g_raw: [f32; 3],
    /// 原始磁场
    pub b_raw: [f32; 3],
    /// 角速度 (deg/s)
    pub w: [f32; 3],
    /// 欧拉角 (deg)
    pub r: [f32; 3],
    /// 四元数 (w, x, y, z)
    pub q: [f32; 4],
    /// 旋转矩阵 (行优先)
    pub rotation_m: [f32; 9],
    /// 偏置旋转矩阵 (行优先)
    pub rot_offset_m: [f32; 9],
    /// 气压 (mbar)
    pub pressure: f32,
    /// 线性加速度 (g)
    pub lin_acc: [f32; 3],
    /// 陀螺仪温度
    pub g_temp: f32,
    /// 高度 (m)
    pub altitude: f32,
    /// 温度 (°C)
    pub temperature: f32,
    /// 升沉运动 (m)
    pub heave_motion: f32,
}

const IDENTITY_M: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

impl Default for ImuSample {
    fn default() -> Self {
        Self {
            timestamp: 0.0,
            frame_count: 0,
            a: [0.0; 3],
            g: [0.0; 3],
            b: [0.0; 3],
            a_raw: [0.0; 3],
            g_raw: [0.0; 3],
            b_raw: [0.0; 3],
            w: [0.0; 3],
            r: [0.0; 3],
            q: [1.0, 0.0, 0.0, 0.0],
            rotation_m: IDENTITY_M,
            rot_offset_m: IDENTITY_M,
            pressure: 0.0,
            lin_acc: [0.0; 3],
            g_temp: 0.0,
            altitude: 0.0,
            temperature: 0.0,
            heave_motion: 0.0,
        }
    }
}

/// GNSS 定位类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixType {
    #[default]
    NoFix,
    DeadReckoningOnly,
    Fix2D,
    Fix3D,
    GnssAndDeadReckoning,
    TimeOnly,
}

impl FixType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::DeadReckoningOnly,
            2 => Self::Fix2D,
            3 => Self::Fix3D,
            4 => Self::GnssAndDeadReckoning,
            5 => Self::TimeOnly,
            _ => Self::NoFix,
        }
    }
}

/// RTK 载波相位解状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarrierPhaseSolution {
    #[default]
    None,
    Float,
    Fixed,
}

impl CarrierPhaseSolution {
    /// 从 NAV-PVT `flags` 的 bit 6..7 解码
    pub fn from_flags(flags: u8) -> Self {
        match (flags >> 6) & 0x03 {
            1 => Self::Float,
            2 => Self::Fixed,
            _ => Self::None,
        }
    }
}

/// 单个 GNSS 采样
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GnssSample {
    /// 时间戳 (秒, GPS 周内时)
    pub timestamp: f64,
    /// 纬度 (度)
    pub latitude: f64,
    /// 经度 (度)
    pub longitude: f64,
    /// 椭球高 (m)
    pub height: f64,
    /// 水平精度 (m)
    pub horizontal_accuracy: f64,
    /// 垂直精度 (m)
    pub vertical_accuracy: f64,
    /// 运动航向 (度)
    pub heading_of_motion: f64,
    /// 车辆航向 (度)
    pub heading_of_vehicle: f64,
    /// 航向精度 (度)
    pub heading_accuracy: f64,
    /// 地速 (m/s)
    pub velocity: f64,
    /// 速度精度 (m/s)
    pub velocity_accuracy: f64,
    pub fix_type: FixType,
    pub carrier_phase_solution: CarrierPhaseSolution,
    pub num_satellites: u8,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 纳秒修正 (可为负)
    pub nano_second_correction: i32,
}

impl GnssSample {
    /// UTC 时间；日期字段无效时返回 `None`
    pub fn utc(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::from_ymd_opt(i32::from(self.year), u32::from(self.month), u32::from(self.day))?;
        let base = date.and_hms_opt(u32::from(self.hour), u32::from(self.minute), u32::from(self.second))?;
        Some(base + chrono::Duration::nanoseconds(i64::from(self.nano_second_correction)))
    }
}
