//! FlashArbitrage 合约 ABI 绑定

use ethers::prelude::*;

// 生成合约绑定 - 使用 JSON ABI 格式
abigen!(
    FlashArbitrageContract,
    r#"[
        {
            "inputs": [
                {"name": "tokenA", "type": "address"},
                {"name": "tokenOut", "type": "address"},
                {"name": "amount", "type": "uint256"}
            ],
            "name": "executeFlashArbitrage",
            "outputs": [],
            "stateMutability": "nonpayable",
            "type": "function"
        },
        {
            "inputs": [],
            "name": "getContractBalance",
            "outputs": [{"name": "", "type": "uint256"}],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [],
            "name": "withdraw",
            "outputs": [],
            "stateMutability": "nonpayable",
            "type": "function"
        }
    ]"#
);
