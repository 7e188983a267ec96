//! 热门种子列表
//!
//! 这些 infohash 只用于宣布（保持节点活跃），从不进入下载流程。

pub const DEFAULT_HOT_SEEDS: &[&str] = &[
    "D37D631A08AB3CE1AC6E73A28E77D569AF77A575",
    "00F4A055C72045C1B355312BCA67A5D77CB6EC70",
    "5D3391505D45E6673A6FE7070D6A98CE8F9F5B1C",
    "51A51B9BDF915EB7FA23E70731CF8FFC8C652D5B",
    "a111ab678ac061d19dcbd0c281750d6f7fbeca3d",
    "2EE5DD8285167C3D6538FE2CB3CDCB2FDFE5AD79",
    "FBE4A9D0C1294120835A8400C89746DD4E6734CD",
    "B1E9CDA314730B132727C9F4FEEE2EB3E780A84B",
    "0EA8759A8FBBA80C4AC9898DC4F3048466490234",
    "C37C904C8BC99EF12A674B105748CDB3F6609E04",
    "EA60FC2DE802D40E0CB08DB06B455F647FE33D4D",
    "7430C9E57AD18B79BD7C2D5465B9830BB4532E48",
    "B64386072F4647A4516EDBBC88977F3E64FE1AEA",
    "A91AC4C642DDB2E677048BDEAECCEDFEBA5E8346",
    "A88BDF0E62D35DAB4B2828E6B0C15D677C70F2E4",
    "EE95ED65A358FAF9BD48008AA340995E27BEAFBE",
    "2A5F34F4DB992100490DE884D6253F35B0B6868D",
    "A58F9A7168874568CF73A1CC8184E52D5859F271",
    "2BA9779A5F8094B35B4CEF7E097E2589F1DADF71",
    "D92D63677029FDE57A7DD64C55754E95B8F3B761",
    "26336CF7130DEB09BA91E41896724A692F04F6B7",
    "E90FD67DC2D7FFCE4042C2FFBE66ABC3C3515790",
    "CE019FF80ABBC8524FAFED1E64838199672BB58E",
    "b8bcfdeece362187b1cb1484e3306b5d4ca7ef3b",
    "dd9b3babb66e1481e1cb0dd2c5ca0d1a6ac2821b",
    "bc0480aca6aeb49c2df9ce5d8ec8638d64f98fa6",
    "f68eb62fab9fed06c9de3abccb2772ca8e1c065c",
    "61A89A9CFC4F223E6C24C8A6930AC1FD067EF4BE",
    "C1F239735AD87F00712CA3AF6E50B788FE66FC26",
    "66CBC985E53E18341127277E9B7EDA13BA4EE230",
    "FF02281C4D7B55D6E498C457BD94362AAE189E7D",
    "AF86C88E059C253809C67B77A85F584C5449DC9C",
    "5694bf863b1d3bcdb67dde2184e199c530996f6d",
    "284215a3c86591933c02f7bca1119dfeded07704",
];
