//! Function codes of both sensor generations
//!
//! The legacy (V0) and Ig1 (V1) firmwares use disjoint opcode maps on the
//! same framing. A small internal table covers the codes whose meaning does
//! not depend on the generation.

macro_rules! opcodes {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $code, )*
        }

        impl $name {
            pub const fn code(self) -> u8 {
                self as u8
            }

            pub const fn from_code(code: u8) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )*
                    _ => None,
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> Self {
                value.code()
            }
        }
    };
}

opcodes! {
    /// Generation independent codes.
    pub enum InternalOpcode {
        Ack = 0,
        Nack = 1,
        UpdateFirmware = 2,
        UpdateIap = 3,
        /// Output data bitset read at init
        Config = 4,
        /// GNSS output data bitset read at init
        ConfigGpsOutputDataBitset = 5,
    }
}

opcodes! {
    /// Legacy sensors (LPMS-CU2, LPMS-B2, ...).
    pub enum OpcodeV0 {
        Ack = 0,
        Nack = 1,
        UpdateFirmware = 2,
        UpdateIap = 3,
        GetConfig = 4,
        GetStatus = 5,
        SetCommandMode = 6,
        SetStreamMode = 7,
        GetRawSensorData = 9,
        SetTransmitData = 10,
        SetSamplingRate = 11,
        WriteRegisters = 15,
        RestoreFactorySettings = 16,
        SetOrientationOffsetMode = 18,
        GetFirmwareInfoOrImuId = 21,
        StartGyroCalibration = 22,
        SetGyrUseAutoCalibration = 23,
        SetGyrRange = 25,
        GetGyrRange = 26,
        SetAccBias = 27,
        GetAccBias = 28,
        SetAccAlignment = 29,
        GetAccAlignment = 30,
        SetAccRange = 31,
        GetAccRange = 32,
        SetMagRange = 33,
        GetMagRange = 34,
        SetMagHardIronOffset = 35,
        GetMagHardIronOffset = 36,
        SetMagSoftIronMatrix = 37,
        GetMagSoftIronMatrix = 38,
        SetFieldRadius = 39,
        GetFieldRadius = 40,
        SetFilterMode = 41,
        GetFilterMode = 42,
        SetFilterPreset = 43,
        GetFilterPreset = 44,
        SetStreamFormat = 45,
        SetCanBaudRate = 46,
        GetFirmwareVersion = 47,
        SetGyrBias = 48,
        GetGyrBias = 49,
        SetGyrAlignment = 50,
        GetGyrAlignment = 51,
        SetCanMapping = 62,
        GetCanMapping = 63,
        SetCanHeartbeat = 64,
        GetCanHeartbeat = 65,
        SetTimestamp = 66,
        SetLinearCompensationRate = 67,
        GetLinearCompensationRate = 68,
        SetCentricCompensationRate = 69,
        GetCentricCompensationRate = 70,
        GetCanConfiguration = 71,
        SetCanChannelMode = 72,
        SetCanPointMode = 73,
        SetCanStartId = 74,
        SetDataMode = 75,
        SetMagAlignment = 76,
        SetMagBias = 77,
        SetMagReference = 78,
        GetMagAlignment = 79,
        GetMagBias = 80,
        GetMagReference = 81,
        ResetOrientationOffset = 82,
        /// Shared with the UART baud rate on RS232 models
        SetBaudRate = 84,
        GetBaudRate = 85,
        SetUartFormat = 86,
        GetBatteryLevel = 87,
        GetBatteryVoltage = 88,
        GetBatteryCharging = 89,
        GetSerialNumber = 90,
        GetDeviceName = 91,
        GetFirmwareInfo = 92,
        GetPing = 98,
    }
}

opcodes! {
    /// Ig1 sensors.
    pub enum OpcodeV1 {
        Ack = 0,
        Nack = 1,
        UpdateFirmware = 2,
        UpdateIap = 3,
        WriteRegisters = 4,
        RestoreFactorySettings = 5,
        GotoCommandMode = 6,
        GotoStreamMode = 7,
        GetSensorStatus = 8,
        GetRawImuSensorData = 9,
        GetRawGpsSensorData = 10,
        GetSensorModel = 20,
        GetFirmwareInfo = 21,
        GetSerialNumber = 22,
        GetFilterVersion = 23,
        SetImuTransmitData = 30,
        GetImuTransmitData = 31,
        SetImuId = 32,
        GetImuId = 33,
        SetStreamFreq = 34,
        GetStreamFreq = 35,
        SetDegGradOutput = 36,
        GetDegGradOutput = 37,
        SetOrientationOffsetMode = 38,
        ResetOrientationOffset = 39,
        SetAccRange = 50,
        GetAccRange = 51,
        SetGyrRange = 60,
        GetGyrRange = 61,
        StartGyroCalibration = 62,
        SetEnableGyrAutoCalibration = 64,
        GetEnableGyrAutoCalibration = 65,
        SetGyrThreshold = 66,
        GetGyrThreshold = 67,
        SetMagRange = 70,
        GetMagRange = 71,
        StartMagCalibration = 84,
        StopMagCalibration = 85,
        SetMagCalibrationTimeout = 86,
        GetMagCalibrationTimeout = 87,
        SetFilterMode = 90,
        GetFilterMode = 91,
        SetCanStartId = 110,
        GetCanStartId = 111,
        SetCanBaudRate = 112,
        GetCanBaudRate = 113,
        SetCanDataPrecision = 114,
        GetCanDataPrecision = 115,
        GetCanMode = 117,
        SetCanMapping = 118,
        GetCanMapping = 119,
        SetCanHeartbeat = 120,
        GetCanHeartbeat = 121,
        SetUartBaudRate = 130,
        GetUartBaudRate = 131,
        SetUartFormat = 132,
        GetUartFormat = 133,
        SetUartAsciiCharacter = 134,
        GetUartAsciiCharacter = 135,
        SetLpBusDataPrecision = 136,
        GetLpBusDataPrecision = 137,
        SetTimestamp = 152,
        SetGpsTransmitData = 160,
        GetGpsTransmitData = 161,
        SaveGpsState = 162,
        ClearGpsState = 163,
        SetRtkCorrection = 166,
    }
}

/// Command mode request, identical on both generations.
pub const SET_COMMAND_MODE: u8 = OpcodeV0::SetCommandMode.code();

/// Firmware info request used for generation detection.
///
/// V0 answers with a 4-byte IMU id, V1 with an ASCII string.
pub const GET_FIRMWARE_INFO: u8 = OpcodeV1::GetFirmwareInfo.code();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_codes() {
        assert_eq!(SET_COMMAND_MODE, OpcodeV1::GotoCommandMode.code());
        assert_eq!(GET_FIRMWARE_INFO, OpcodeV0::GetFirmwareInfoOrImuId.code());
        assert_eq!(InternalOpcode::Config.code(), OpcodeV0::GetConfig.code());
    }

    #[test]
    fn test_from_code() {
        assert_eq!(OpcodeV1::from_code(30), Some(OpcodeV1::SetImuTransmitData));
        assert_eq!(OpcodeV1::from_code(200), None);
        assert_eq!(OpcodeV0::from_code(47), Some(OpcodeV0::GetFirmwareVersion));
        assert_eq!(u8::from(OpcodeV0::GetPing), 98);
    }
}
