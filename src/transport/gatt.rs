//! GATT service and characteristic identifiers.

/// Lorax firmware.
pub mod lorax {
    use uuid::Uuid;

    /// Primary Lorax service; its presence selects Lorax mode.
    pub const SERVICE: Uuid = Uuid::from_u128(0x2c95_25ed_f8b3_4d05_ad13_4822_269a_360e);
    /// Pup sub-service.
    pub const PUP_SERVICE: Uuid = Uuid::from_u128(0x9288_1195_65ab_439f_a1a7_48fb_bbbb_f458);
    /// OTA sub-service found on non-Pup Lorax firmware.
    pub const OTA_SERVICE: Uuid = Uuid::from_u128(0xfe80_6575_e77e_4605_b389_c42e_bd28_517e);

    /// Request frames are written here.
    pub const COMMAND: Uuid = Uuid::from_u128(0x57a9_71d4_932a_49c6_85cb_ed39_a8eb_845f);
    /// Reply frames are notified here.
    pub const REPLY: Uuid = Uuid::from_u128(0xe5a5_cb32_38bd_4bd6_aa99_285e_efca_69e1);
    /// Watch events are notified here.
    pub const EVENT: Uuid = Uuid::from_u128(0xc4a8_703b_7ed8_49dc_8aad_f1f0_e78b_30fe);
    /// Protocol version string.
    pub const VERSION: Uuid = Uuid::from_u128(0xbd68_75f1_8199_45ba_8deb_9ed0_5dad_e6cd);

    /// Read to trigger OS pairing on Pup firmware.
    pub const PUP_DIAGNOSTIC: Uuid = Uuid::from_u128(0x445b_a573_e757_414d_9f79_acdd_2d17_6189);
    /// Read to trigger OS pairing on OTA firmware.
    pub const OTA_DIAGNOSTIC: Uuid = Uuid::from_u128(0x7f95_4120_bacd_43ba_b0c7_738d_62ae_b1a7);
}

/// Legacy firmware, one characteristic per value.
pub mod legacy {
    use uuid::Uuid;

    /// Primary legacy service.
    pub const SERVICE: Uuid = Uuid::from_u128(0x2e09_bae5_c4f8_4ef6_a969_1c37_dbd0_2343);
    /// Model information service, required in legacy mode.
    pub const MODEL_INFO_SERVICE: Uuid =
        Uuid::from_u128(0xf86e_073b_da80_4eba_9cd9_08d3_9dba_fc23);

    pub const ACCESS_SEED_KEY: Uuid = Uuid::from_u128(0xc4cc_f225_5fbb_4da9_99d7_f60a_8062_2b4a);
    pub const OPERATING_STATE: Uuid = Uuid::from_u128(0x87f0_c98a_f823_47d4_9423_6b31_ab9b_abc1);
    pub const HEATER_TEMP: Uuid = Uuid::from_u128(0xfffc_4c61_8140_4da3_974f_215b_ce97_af12);
    pub const BATTERY_LEVEL: Uuid = Uuid::from_u128(0x0511_ed13_c7f3_40d6_b14f_b123_0ad2_f8fd);
    pub const CHARGE_SOURCE: Uuid = Uuid::from_u128(0xfa33_d9b1_a5a7_4cfd_84de_87e0_9800_2237);
    pub const TOTAL_DABS: Uuid = Uuid::from_u128(0x7013_5760_ca4d_423f_82b0_fd79_2c93_b593);
    pub const LED_COLOR: Uuid = Uuid::from_u128(0x386d_6464_e37f_4dc4_9e0b_081e_4267_6224);
    pub const LED_BRIGHTNESS: Uuid = Uuid::from_u128(0x31a2_b8a5_791f_4444_9e76_c4ae_a69b_0d09);

    /// Writing a profile index selects which profile the profile
    /// characteristics below expose.
    pub const PROFILE_CURRENT: Uuid = Uuid::from_u128(0x2514_8386_e0b4_4a4c_ba05_0c24_5f36_17ae);
    pub const PROFILE_NAME: Uuid = Uuid::from_u128(0x58e0_ac49_7ce1_4689_af65_a6a8_8e0e_ca9e);
    pub const PROFILE_TEMP: Uuid = Uuid::from_u128(0xfeb7_6125_38fe_4b8d_aca4_013a_a3df_3454);
    pub const PROFILE_TIME: Uuid = Uuid::from_u128(0x7c5e_c8a1_c77f_48c5_8e6c_a9f3_f9fe_c051);
    pub const PROFILE_COLOR: Uuid = Uuid::from_u128(0x1ddd_cc3e_5311_430e_9f3d_b924_201e_d51b);

    pub const DEVICE_NAME: Uuid = Uuid::from_u128(0xba7a_86ac_518d_494b_bc6d_fdc6_9c49_0f6b);
    pub const MODEL_NUMBER: Uuid = Uuid::from_u128(0x10cd_89ad_0b00_44f7_b23d_0582_32ee_ca8f);
    pub const FIRMWARE_VERSION: Uuid = Uuid::from_u128(0xe8e4_9435_7650_44c6_91b5_796b_4f99_ddfc);
    pub const GIT_HASH: Uuid = Uuid::from_u128(0xd875_3e95_5449_4fa1_b7f0_59d4_24b2_d148);
}
